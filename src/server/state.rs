//! Application state for dependency injection.
//!
//! This module provides the application state that is shared
//! between all request handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::config::Config;
use crate::inference::InferenceHandler;
use crate::model::{ModelLoader, ModelState};

/// Shared application state containing dependencies.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Arc<Config>,

    /// Model readiness and the loaded bundle
    pub model_state: Arc<ModelState>,

    /// Transcription pipeline
    pub inference: Arc<InferenceHandler>,

    /// Prometheus exporter, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create the state with an empty model slot backed by `loader`.
    pub fn new(config: Arc<Config>, loader: Arc<dyn ModelLoader>) -> Self {
        let model_state = Arc::new(ModelState::new(loader));
        let inference = Arc::new(InferenceHandler::new(Arc::clone(&model_state), &config));

        Self {
            config,
            model_state,
            inference,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

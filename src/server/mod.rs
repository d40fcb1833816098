//! Web server and API implementation.
//!
//! This module provides the HTTP routes, the shared state and the
//! Prometheus metrics for the speech-to-text service.

mod handlers;
pub mod metrics;
mod state;

pub use handlers::{
    create_router, health_check, metrics_handler, root, speech_to_text, supported_languages,
    HealthResponse, LanguagesResponse, TranscriptionResponse,
};
pub use state::AppState;

//! Model loading with ordered fallback.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::artifacts::{GenerationSettings, ModelRepository};
use crate::model::device::{select_device, ResourceProfile};
use crate::model::features::{FeatureConfig, FeatureExtractor};
use crate::model::onnx::OnnxSpeechModel;
use crate::model::strategy::{plan, LoadStrategy};
use crate::model::tokenizer::HfTokenDecoder;
use crate::model::traits::TokenDecoder;
use crate::model::types::{Device, LoadError, ModelBundle};

/// Produces a complete [`ModelBundle`] or nothing.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<ModelBundle, LoadError>;

    /// Identifier of what is being loaded, for logs.
    fn target(&self) -> &str;

    /// Device the first loading strategy targets.
    fn device(&self) -> Device;
}

/// Loads the configured registry model with ONNX Runtime.
pub struct RegistryModelLoader {
    config: Arc<Config>,
}

impl RegistryModelLoader {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for RegistryModelLoader {
    async fn load(&self) -> Result<ModelBundle, LoadError> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || load_from_registry(&config))
            .await
            .map_err(|e| LoadError::Task(e.to_string()))?
    }

    fn target(&self) -> &str {
        &self.config.model_name
    }

    fn device(&self) -> Device {
        select_device(&ResourceProfile::detect(&self.config))
    }
}

fn load_from_registry(config: &Config) -> Result<ModelBundle, LoadError> {
    let profile = ResourceProfile::detect(config);
    let strategies = plan(&profile);

    let repo = ModelRepository::open(config)?;
    let artifacts = repo.fetch()?;

    let tokenizer: Arc<dyn TokenDecoder> = Arc::new(HfTokenDecoder::from_file(&artifacts.tokenizer)?);
    let feature_extractor = FeatureExtractor::from_config_file(&artifacts.preprocessor_config)?;
    check_sample_rate(feature_extractor.config(), config.target_sample_rate)?;
    let settings = GenerationSettings::from_file(artifacts.generation_config.as_deref())?;

    load_with_fallback(repo.model_name(), &strategies, |strategy| {
        let graphs = repo.graphs(strategy.precision, &artifacts)?;
        if let Some(ceiling) = profile.memory_ceiling_mb {
            let size = graphs.size_mb();
            if size > ceiling {
                warn!(
                    strategy = %strategy,
                    size_mb = size,
                    ceiling_mb = ceiling,
                    "Model graphs exceed the memory ceiling"
                );
            }
        }

        let model = OnnxSpeechModel::load(
            &graphs,
            strategy,
            &profile,
            Arc::clone(&tokenizer),
            settings,
            config.max_new_tokens,
        )?;

        Ok(ModelBundle {
            model: Arc::new(model),
            feature_extractor: feature_extractor.clone(),
            tokenizer: Arc::clone(&tokenizer),
            device: strategy.device,
            strategy: *strategy,
        })
    })
}

/// Audio is resampled to the configured rate, so it must be the rate the
/// feature extractor accepts.
pub fn check_sample_rate(features: &FeatureConfig, target_sample_rate: u32) -> Result<(), LoadError> {
    if features.sampling_rate == target_sample_rate {
        Ok(())
    } else {
        Err(LoadError::Config(format!(
            "TARGET_SAMPLE_RATE is {} Hz but the model's feature extractor expects {} Hz",
            target_sample_rate, features.sampling_rate
        )))
    }
}

/// Try each strategy in order; the first complete bundle wins.
pub fn load_with_fallback<F>(
    model_name: &str,
    strategies: &[LoadStrategy],
    mut attempt: F,
) -> Result<ModelBundle, LoadError>
where
    F: FnMut(&LoadStrategy) -> Result<ModelBundle, LoadError>,
{
    let mut failures = Vec::with_capacity(strategies.len());

    for strategy in strategies {
        let started = Instant::now();
        match attempt(strategy) {
            Ok(bundle) => {
                info!(
                    model = model_name,
                    device = %strategy.device,
                    strategy = %strategy,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                return Ok(bundle);
            }
            Err(e) => {
                warn!(
                    model = model_name,
                    device = %strategy.device,
                    strategy = %strategy,
                    error = %e,
                    "Loading strategy failed, trying next"
                );
                failures.push(format!("{}: {}", strategy, e));
            }
        }
    }

    Err(LoadError::Exhausted(failures))
}

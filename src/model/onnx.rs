//! SeamlessM4T speech-to-text on ONNX Runtime.
//!
//! The speech encoder runs once per utterance; the text decoder is re-run
//! greedily over the growing token prefix until EOS.

use ndarray::Array2;
use ort::logging::LogLevel;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::model::artifacts::{GenerationSettings, GraphPaths};
use crate::model::device::ResourceProfile;
use crate::model::features::FeatureBatch;
use crate::model::generation::GeneratedTokens;
use crate::model::strategy::LoadStrategy;
use crate::model::traits::{SpeechModel, TokenDecoder};
use crate::model::types::{Device, GenerationError, LoadError};

const ENCODER_FEATURES: &str = "input_features";
const ENCODER_MASK: &str = "attention_mask";
const ENCODER_OUTPUT: &str = "last_hidden_state";
const DECODER_IDS: &str = "input_ids";
const DECODER_HIDDEN: &str = "encoder_hidden_states";
const DECODER_MASK: &str = "encoder_attention_mask";
const DECODER_OUTPUT: &str = "logits";

/// Encoder/decoder session pair with greedy decoding.
pub struct OnnxSpeechModel {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Arc<dyn TokenDecoder>,
    settings: GenerationSettings,
    max_new_tokens: usize,
    label: String,
}

impl OnnxSpeechModel {
    /// Build both sessions for `strategy`.
    pub fn load(
        graphs: &GraphPaths,
        strategy: &LoadStrategy,
        profile: &ResourceProfile,
        tokenizer: Arc<dyn TokenDecoder>,
        settings: GenerationSettings,
        max_new_tokens: usize,
    ) -> Result<Self, LoadError> {
        info!(
            strategy = %strategy,
            encoder = %graphs.encoder.display(),
            decoder = %graphs.decoder.display(),
            "Building ONNX sessions"
        );

        let encoder = build_session(&graphs.encoder, strategy, profile)?;
        let decoder = build_session(&graphs.decoder, strategy, profile)?;

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            settings,
            max_new_tokens,
            label: format!("onnx/{}", strategy),
        })
    }

    fn language_token(&self, tgt_lang: &str) -> Result<i64, GenerationError> {
        self.tokenizer
            .token_to_id(&format!("__{}__", tgt_lang))
            .map(i64::from)
            .ok_or_else(|| GenerationError::UnknownLanguage(tgt_lang.to_string()))
    }

    /// Returns the encoder hidden state shape and data.
    fn encode(&self, features: &FeatureBatch) -> Result<(Vec<i64>, Vec<f32>), GenerationError> {
        let (batch, frames, dims) = features.features.dim();
        if features.attention_mask.dim() != (batch, frames) {
            return Err(GenerationError::InvalidInput(format!(
                "attention mask {:?} does not match features {:?}",
                features.attention_mask.dim(),
                (batch, frames, dims)
            )));
        }

        let input = Tensor::from_array((
            vec![batch as i64, frames as i64, dims as i64],
            features.features.iter().copied().collect::<Vec<f32>>(),
        ))
        .map_err(inference_error("input_features tensor"))?;
        let mask = Tensor::from_array((
            vec![batch as i64, frames as i64],
            features.attention_mask.iter().copied().collect::<Vec<i64>>(),
        ))
        .map_err(inference_error("attention_mask tensor"))?;

        let mut encoder = self.encoder.lock();
        let outputs = encoder
            .run(ort::inputs![ENCODER_FEATURES => input, ENCODER_MASK => mask])
            .map_err(inference_error("encoder run"))?;
        let (shape, hidden) = outputs[ENCODER_OUTPUT]
            .try_extract_tensor::<f32>()
            .map_err(inference_error("extract encoder output"))?;

        let shape: Vec<i64> = shape.iter().copied().collect();
        if shape.len() != 3 {
            return Err(GenerationError::Inference(format!(
                "unexpected encoder output shape: {:?}",
                shape
            )));
        }
        Ok((shape, hidden.to_vec()))
    }

    /// Argmax of the last position's logits for the current prefix.
    fn next_token(
        decoder: &mut Session,
        prefix: &[i64],
        hidden_shape: &[i64],
        hidden: &[f32],
    ) -> Result<i64, GenerationError> {
        let encoder_len = hidden_shape[1];
        let ids = Tensor::from_array((vec![1, prefix.len() as i64], prefix.to_vec()))
            .map_err(inference_error("input_ids tensor"))?;
        let hidden_states = Tensor::from_array((hidden_shape.to_vec(), hidden.to_vec()))
            .map_err(inference_error("encoder_hidden_states tensor"))?;
        let mask = Tensor::from_array((vec![1, encoder_len], vec![1i64; encoder_len as usize]))
            .map_err(inference_error("encoder_attention_mask tensor"))?;

        let outputs = decoder
            .run(ort::inputs![
                DECODER_IDS => ids,
                DECODER_HIDDEN => hidden_states,
                DECODER_MASK => mask
            ])
            .map_err(inference_error("decoder run"))?;
        let (shape, logits) = outputs[DECODER_OUTPUT]
            .try_extract_tensor::<f32>()
            .map_err(inference_error("extract logits"))?;

        let vocab = match shape.iter().as_slice() {
            [_, _, vocab] if *vocab > 0 => *vocab as usize,
            other => {
                return Err(GenerationError::Inference(format!(
                    "unexpected logits shape: {:?}",
                    other
                )))
            }
        };
        let last = logits
            .chunks_exact(vocab)
            .last()
            .ok_or_else(|| GenerationError::Inference("empty logits".to_string()))?;

        let (best, _) = last
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
                if v > bv {
                    (i, v)
                } else {
                    (bi, bv)
                }
            });
        Ok(best as i64)
    }
}

impl SpeechModel for OnnxSpeechModel {
    fn generate(
        &self,
        features: &FeatureBatch,
        tgt_lang: &str,
    ) -> Result<GeneratedTokens, GenerationError> {
        let lang_token = self.language_token(tgt_lang)?;
        let (hidden_shape, hidden) = self.encode(features)?;

        let eos = i64::from(self.settings.eos_token_id);
        let mut tokens = vec![i64::from(self.settings.decoder_start_token_id), lang_token];

        let mut decoder = self.decoder.lock();
        for _ in 0..self.max_new_tokens {
            let next = Self::next_token(&mut decoder, &tokens, &hidden_shape, &hidden)?;
            tokens.push(next);
            if next == eos {
                break;
            }
        }
        drop(decoder);

        debug!(tgt_lang, generated = tokens.len() - 2, "Greedy decoding finished");

        let len = tokens.len();
        let output = Array2::from_shape_vec((1, len), tokens)
            .map_err(|e| GenerationError::Inference(e.to_string()))?;
        Ok(GeneratedTokens::Tensor(output.into_dyn()))
    }

    fn name(&self) -> &str {
        &self.label
    }
}

fn inference_error<E: fmt::Display>(stage: &'static str) -> impl Fn(E) -> GenerationError {
    move |e| GenerationError::Inference(format!("{}: {}", stage, e))
}

fn session_error(strategy: &LoadStrategy, stage: &str, e: impl fmt::Display) -> LoadError {
    LoadError::Session {
        strategy: strategy.to_string(),
        message: format!("{}: {}", stage, e),
    }
}

/// Session options per strategy.
///
/// Memory-efficient sessions disable memory-pattern planning, use basic graph
/// optimisation and cap intra-op threads. Graphs are always committed from
/// file so external weight data stays on disk until the runtime maps it.
pub fn build_session(
    path: &Path,
    strategy: &LoadStrategy,
    profile: &ResourceProfile,
) -> Result<Session, LoadError> {
    let mut builder = Session::builder()
        .map_err(|e| session_error(strategy, "session builder", e))?
        .with_log_level(LogLevel::Warning)
        .map_err(|e| session_error(strategy, "log level", e))?;

    builder = if strategy.low_memory() {
        builder
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(|e| session_error(strategy, "optimization level", e))?
            .with_memory_pattern(false)
            .map_err(|e| session_error(strategy, "memory pattern", e))?
    } else {
        builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| session_error(strategy, "optimization level", e))?
    };

    if let Some(threads) = strategy.intra_threads(profile) {
        builder = builder
            .with_intra_threads(threads)
            .map_err(|e| session_error(strategy, "thread config", e))?;
    }

    if strategy.device == Device::Accelerator {
        builder = with_accelerator(builder, strategy)?;
    }

    builder
        .commit_from_file(path)
        .map_err(|e| session_error(strategy, &format!("load {}", path.display()), e))
}

#[cfg(feature = "cuda")]
fn with_accelerator(builder: SessionBuilder, strategy: &LoadStrategy) -> Result<SessionBuilder, LoadError> {
    use ort::execution_providers::CUDAExecutionProvider;

    builder
        .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
        .map_err(|e| session_error(strategy, "cuda execution provider", e))
}

#[cfg(not(feature = "cuda"))]
fn with_accelerator(_builder: SessionBuilder, strategy: &LoadStrategy) -> Result<SessionBuilder, LoadError> {
    Err(session_error(
        strategy,
        "cuda execution provider",
        "built without the `cuda` feature",
    ))
}

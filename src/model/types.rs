//! Core model domain types.
//!
//! Defines the compute device, the fully loaded model bundle and the typed
//! errors raised below the HTTP boundary.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::model::features::FeatureExtractor;
use crate::model::strategy::LoadStrategy;
use crate::model::traits::{SpeechModel, TokenDecoder};

/// Compute device the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Device {
    /// General-purpose CPU execution
    #[serde(rename = "cpu")]
    Cpu,
    /// CUDA accelerator
    #[serde(rename = "cuda")]
    Accelerator,
}

impl Device {
    /// Name reported by the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Accelerator => "cuda",
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Accelerator)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything inference needs, published as one unit once loading succeeds.
pub struct ModelBundle {
    /// Sequence generation backend
    pub model: Arc<dyn SpeechModel>,
    /// Waveform to encoder-input converter
    pub feature_extractor: FeatureExtractor,
    /// Token id to text decoder
    pub tokenizer: Arc<dyn TokenDecoder>,
    /// Device the model was loaded on
    pub device: Device,
    /// Strategy that produced this bundle
    pub strategy: LoadStrategy,
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("device", &self.device)
            .field("strategy", &self.strategy)
            .field("feature_extractor", &self.feature_extractor)
            .finish_non_exhaustive()
    }
}

/// Errors while acquiring model artifacts or building sessions.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Registry unreachable or a required file is missing.
    #[error("model artifacts unavailable: {0}")]
    Artifacts(String),

    /// ONNX Runtime rejected the graph or the session options.
    #[error("session creation failed ({strategy}): {message}")]
    Session { strategy: String, message: String },

    /// Tokenizer file could not be parsed.
    #[error("tokenizer load failed: {0}")]
    Tokenizer(String),

    /// Model configuration file is malformed.
    #[error("invalid model configuration: {0}")]
    Config(String),

    /// Every strategy in the plan failed.
    #[error("all loading strategies failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),

    /// The blocking load task panicked or was cancelled.
    #[error("load task failed: {0}")]
    Task(String),
}

impl LoadError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::Artifacts(_) => "artifacts",
            LoadError::Session { .. } => "session",
            LoadError::Tokenizer(_) => "tokenizer",
            LoadError::Config(_) => "config",
            LoadError::Exhausted(_) => "exhausted",
            LoadError::Task(_) => "task",
        }
    }
}

/// Errors raised by the generation routine.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The tokenizer has no forced-language token for this code.
    #[error("language code '{0}' is not known to the model")]
    UnknownLanguage(String),

    /// Input tensors are inconsistent with the graph.
    #[error("invalid model input: {0}")]
    InvalidInput(String),

    /// ONNX Runtime failed while running a graph.
    #[error("inference error: {0}")]
    Inference(String),
}

/// Errors while turning generation output into text.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Generation output does not match any supported shape.
    #[error("unrecognized generation output: {type_name} (len {len}): {detail}")]
    UnrecognizedShape {
        type_name: &'static str,
        len: usize,
        detail: String,
    },

    /// Token id outside the tokenizer's id range.
    #[error("token id {0} is out of range")]
    InvalidTokenId(i64),

    /// The tokenizer itself failed.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

/// Errors while computing encoder input features.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("expected audio sampled at {expected} Hz, got {actual} Hz")]
    SampleRate { expected: u32, actual: u32 },

    #[error("audio too short: {samples} samples, need at least {required}")]
    TooShort { samples: usize, required: usize },

    #[error("invalid feature extractor configuration: {0}")]
    Config(String),
}

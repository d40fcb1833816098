//! Speech model lifecycle: artifacts, loading strategies, features, generation
//! and token decoding.

pub mod artifacts;
pub mod device;
pub mod features;
pub mod generation;
pub mod loader;
pub mod onnx;
pub mod state;
pub mod strategy;
pub mod tokenizer;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use device::{select_device, ResourceProfile};
pub use features::{FeatureBatch, FeatureConfig, FeatureExtractor};
pub use generation::{decode_first_sequence, GeneratedTokens};
pub use loader::{ModelLoader, RegistryModelLoader};
pub use state::ModelState;
pub use strategy::{plan, LoadStrategy, Precision, StrategyKind};
pub use tokenizer::HfTokenDecoder;
pub use traits::{SpeechModel, TokenDecoder};
pub use types::{DecodeError, Device, FeatureError, GenerationError, LoadError, ModelBundle};

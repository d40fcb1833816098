//! Trait abstractions for the model components.
//!
//! The request path only talks to these traits, so the ONNX backend and the
//! registry tokenizer can be swapped for in-process fakes in tests.

use crate::model::features::FeatureBatch;
use crate::model::generation::GeneratedTokens;
use crate::model::types::{DecodeError, GenerationError};

/// Speech-to-text sequence generation.
///
/// Implementations are blocking; callers run them on the blocking pool.
pub trait SpeechModel: Send + Sync {
    /// Generate target-language token ids for one utterance.
    ///
    /// `tgt_lang` is the three-letter catalog code, e.g. `"eng"`.
    fn generate(
        &self,
        features: &FeatureBatch,
        tgt_lang: &str,
    ) -> Result<GeneratedTokens, GenerationError>;

    /// Short backend description for logs.
    fn name(&self) -> &str;
}

/// Token-text conversion.
pub trait TokenDecoder: Send + Sync {
    /// Decode ids to text.
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, DecodeError>;

    /// Number of ids the vocabulary knows.
    fn vocab_size(&self) -> usize;

    /// Look up a single token.
    fn token_to_id(&self, token: &str) -> Option<u32>;
}

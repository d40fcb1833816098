//! Tokenizer wrapper around the `tokenizers` crate.

use std::path::Path;
use tokenizers::Tokenizer;

use crate::model::traits::TokenDecoder;
use crate::model::types::{DecodeError, LoadError};

/// `TokenDecoder` backed by a registry `tokenizer.json`.
pub struct HfTokenDecoder {
    tokenizer: Tokenizer,
}

impl HfTokenDecoder {
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| LoadError::Tokenizer(format!("{}: {}", path.display(), e)))?;
        Ok(Self { tokenizer })
    }
}

impl TokenDecoder for HfTokenDecoder {
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, DecodeError> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| DecodeError::Tokenizer(e.to_string()))
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }
}

/// Remove the spaces a word-piece decode leaves before punctuation and
/// English contractions.
pub fn clean_up_tokenization(text: &str) -> String {
    const REPLACEMENTS: [(&str, &str); 10] = [
        (" .", "."),
        (" ?", "?"),
        (" !", "!"),
        (" ,", ","),
        (" ' ", "'"),
        (" n't", "n't"),
        (" 'm", "'m"),
        (" 's", "'s"),
        (" 've", "'ve"),
        (" 're", "'re"),
    ];

    REPLACEMENTS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

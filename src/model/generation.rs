//! Generation output normalisation and decoding.
//!
//! Backends hand back token ids in one of a few shapes. Everything is folded
//! into a sequence-of-sequences first, then only the first sequence is decoded.

use ndarray::ArrayD;

use crate::model::tokenizer::clean_up_tokenization;
use crate::model::traits::TokenDecoder;
use crate::model::types::DecodeError;

/// Raw token ids produced by a generation routine.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedTokens {
    /// `[batch, len]` or `[len]` tensor
    Tensor(ArrayD<i64>),
    /// Batch of sequences
    Nested(Vec<Vec<i64>>),
    /// Single sequence
    Flat(Vec<i64>),
}

impl GeneratedTokens {
    /// Name of the concrete shape, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            GeneratedTokens::Tensor(_) => "Tensor",
            GeneratedTokens::Nested(_) => "Nested",
            GeneratedTokens::Flat(_) => "Flat",
        }
    }

    /// Outer length: rows of a tensor or batch, ids of a flat sequence.
    pub fn len(&self) -> usize {
        match self {
            GeneratedTokens::Tensor(t) => t.shape().first().copied().unwrap_or(0),
            GeneratedTokens::Nested(rows) => rows.len(),
            GeneratedTokens::Flat(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalise every supported shape into a list of sequences.
    pub fn into_sequences(self) -> Result<Vec<Vec<u32>>, DecodeError> {
        let type_name = self.type_name();
        let len = self.len();
        let shape_error = |detail: String| DecodeError::UnrecognizedShape {
            type_name,
            len,
            detail,
        };

        let rows: Vec<Vec<i64>> = match self {
            GeneratedTokens::Tensor(tensor) => match tensor.ndim() {
                1 => vec![tensor.iter().copied().collect()],
                2 => tensor
                    .outer_iter()
                    .map(|row| row.iter().copied().collect())
                    .collect(),
                n => return Err(shape_error(format!("{} dimensions", n))),
            },
            GeneratedTokens::Nested(rows) => rows,
            GeneratedTokens::Flat(ids) => vec![ids],
        };

        if rows.is_empty() {
            return Err(shape_error("empty batch".to_string()));
        }

        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|id| u32::try_from(id).map_err(|_| DecodeError::InvalidTokenId(id)))
                    .collect::<Result<Vec<u32>, DecodeError>>()
            })
            .collect()
    }
}

impl From<Vec<i64>> for GeneratedTokens {
    fn from(ids: Vec<i64>) -> Self {
        GeneratedTokens::Flat(ids)
    }
}

impl From<Vec<Vec<i64>>> for GeneratedTokens {
    fn from(rows: Vec<Vec<i64>>) -> Self {
        GeneratedTokens::Nested(rows)
    }
}

/// Decode the first generated sequence to cleaned-up text.
pub fn decode_first_sequence(
    decoder: &dyn TokenDecoder,
    generated: GeneratedTokens,
) -> Result<String, DecodeError> {
    let sequences = generated.into_sequences()?;
    let first = sequences.into_iter().next().unwrap_or_default();

    let vocab_size = decoder.vocab_size();
    if let Some(&bad) = first.iter().find(|&&id| id as usize >= vocab_size) {
        return Err(DecodeError::InvalidTokenId(i64::from(bad)));
    }

    let text = decoder.decode(&first, true)?;
    Ok(clean_up_tokenization(&text))
}

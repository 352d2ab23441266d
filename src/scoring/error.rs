use thiserror::Error;

use crate::inference::{InferenceError, TokenId};

use super::types::Polarity;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("logits must have rank 2 or 3, got rank {rank} with dims {dims:?}")]
    MalformedLogitShape { rank: usize, dims: Vec<usize> },

    #[error("candidate token {token_id} is outside the vocabulary of size {vocab_size}")]
    TokenOutOfRange { token_id: TokenId, vocab_size: usize },

    #[error("no {polarity} candidate encodes to a single token (tried {surfaces:?})")]
    NoSingleTokenCandidate {
        polarity: Polarity,
        surfaces: Vec<String>,
    },

    #[error("logit for candidate token {token_id} is not finite: {logit}")]
    NonFiniteLogit { token_id: TokenId, logit: f32 },

    #[error("logits tensor is empty (dims {dims:?})")]
    EmptyLogits { dims: Vec<usize> },

    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
}

impl From<candle_core::Error> for ScoringError {
    fn from(err: candle_core::Error) -> Self {
        ScoringError::Inference(InferenceError::from(err))
    }
}

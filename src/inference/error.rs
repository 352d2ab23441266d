use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model not found at path: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("failed to load model: {reason}")]
    ModelLoadFailed { reason: String },

    #[error("inference failed: {reason}")]
    InferenceFailed { reason: String },

    #[error("tokenization failed: {reason}")]
    TokenizationFailed { reason: String },

    #[error("invalid generation configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("provider does not expose a tensor named '{name}'")]
    UnknownTensor { name: String },

    #[error("no generation context: prime the provider first")]
    NotPrimed,

    #[error("generation already complete")]
    GenerationComplete,

    #[error("no generated sequence at index {index}")]
    SequenceOutOfRange { index: usize },

    #[error("prompt of {tokens} tokens does not fit max_length {max_length}")]
    ContextExhausted { tokens: usize, max_length: usize },
}

impl From<candle_core::Error> for InferenceError {
    fn from(err: candle_core::Error) -> Self {
        InferenceError::InferenceFailed {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for InferenceError {
    fn from(err: std::io::Error) -> Self {
        InferenceError::ModelLoadFailed {
            reason: err.to_string(),
        }
    }
}

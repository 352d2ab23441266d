use thiserror::Error;

use crate::decoding::DecodingError;
use crate::inference::InferenceError;
use crate::scoring::ScoringError;

use super::types::FailureKind;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model, tokenizer or device could not be brought up. Aborts the run.
    #[error("model load failed: {source}")]
    ModelLoad {
        #[source]
        source: InferenceError,
    },

    #[error("scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("decoding failed: {0}")]
    Decoding(#[from] DecodingError),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

impl PipelineError {
    /// Taxonomy entry reported for a pair that failed with this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Scoring(err) => match err {
                ScoringError::MalformedLogitShape { .. } | ScoringError::EmptyLogits { .. } => {
                    FailureKind::MalformedLogitShape
                }
                ScoringError::TokenOutOfRange { .. }
                | ScoringError::NoSingleTokenCandidate { .. } => FailureKind::TokenOutOfRange,
                ScoringError::NonFiniteLogit { .. } => FailureKind::NonFiniteLogit,
                ScoringError::Inference(inner) => inference_kind(inner),
            },
            PipelineError::Decoding(_) => FailureKind::Decoding,
            PipelineError::Inference(err) | PipelineError::ModelLoad { source: err } => {
                inference_kind(err)
            }
        }
    }
}

fn inference_kind(err: &InferenceError) -> FailureKind {
    match err {
        InferenceError::TokenizationFailed { .. } => FailureKind::Tokenization,
        InferenceError::ContextExhausted { .. } => FailureKind::ContextExhausted,
        _ => FailureKind::Inference,
    }
}

use thiserror::Error;

use crate::inference::InferenceError;

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("decoding step {step} failed: {source}")]
    Step {
        step: usize,
        #[source]
        source: InferenceError,
    },

    #[error("decoder already finished in state {state}")]
    Finished { state: super::DecoderState },

    #[error("streaming detokenization failed: {0}")]
    Detokenize(#[source] InferenceError),
}

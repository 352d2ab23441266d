//! Bounded decoding.
//!
//! Once the decision logits are captured, the judge also lets the model speak: a short
//! greedy generation whose text corroborates the score. [`BoundedDecoder`] runs the
//! `Ready -> Generating -> (Done | Capped)` state machine over an already primed
//! [`InferenceProvider`](crate::inference::InferenceProvider). Reaching the cap is a
//! normal outcome, not an error.

mod decoder;
mod error;


use std::fmt;

use serde::Serialize;

pub use decoder::{BoundedDecoder, GenerationTranscript};
pub use error::DecodingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderState {
    /// Primed, nothing generated yet.
    Ready,
    Generating,
    /// Provider reported completion.
    Done,
    /// Token cap reached before completion.
    Capped,
}

impl DecoderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecoderState::Done | DecoderState::Capped)
    }
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderState::Ready => write!(f, "ready"),
            DecoderState::Generating => write!(f, "generating"),
            DecoderState::Done => write!(f, "done"),
            DecoderState::Capped => write!(f, "capped"),
        }
    }
}

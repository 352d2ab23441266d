//! Pair orchestration.
//!
//! A [`JudgeSession`] owns the loaded model and tokenizer plus the resolved candidate
//! set. A [`PairOrchestrator`] borrows it mutably and runs query/document pairs strictly
//! one after another, since the provider's generation context is not reentrant.
//!
//! Failures are per pair: a malformed logits tensor or a failed forward pass becomes a
//! [`PairFailure`] in the [`BatchReport`] at that pair's position, and the batch moves on.
//! Only [`PipelineError::ModelLoad`] (from [`JudgeSession::open`]) aborts a run.

mod error;
mod orchestrator;
mod session;
mod types;


pub use error::PipelineError;
pub use orchestrator::PairOrchestrator;
pub use session::{JudgeSession, SessionSettings};
pub use types::{
    BatchReport, FailureKind, PairFailure, PairOutcome, PairResult, QueryDocumentPair, preview,
};

//! Relevance judge library crate (used by the `judge` binary and integration tests).
//!
//! Asks an instruction-tuned causal LM whether a document satisfies a query and turns
//! the answer into a probability: the next-token logits of a single-token "yes" and
//! "no" are compared with a two-way softmax. A short bounded generation from the same
//! primed context supplies the literal answer alongside the score.
//!
//! # Public API Surface
//!
//! ## Core Types
//! - [`Config`], [`ConfigError`] - Environment-backed configuration
//! - [`JudgeSession`], [`PairOrchestrator`] - Loaded model + batch runner
//! - [`QueryDocumentPair`], [`PairResult`], [`PairFailure`], [`BatchReport`] - Batch I/O
//!
//! ## Scoring & Decoding
//! - [`DecisionScorer`], [`CandidatePolicy`], [`RelevanceScore`] - Logits to probability
//! - [`BoundedDecoder`], [`GenerationTranscript`], [`DecoderState`] - Capped generation
//! - [`build_prompt`], [`PromptTemplate`] - Prompt construction
//!
//! ## Inference
//! - [`VocabularyOracle`], [`InferenceProvider`], [`IncrementalDecoder`] - Model seams
//! - [`TokenizerOracle`], [`CausalLmProvider`] - candle + `tokenizers` implementations
//!
//! ## Test/Mock Support
//! Mock implementations are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod config;
pub mod constants;
pub mod decoding;
pub mod inference;
pub mod pipeline;
pub mod prompt;
pub mod scoring;

pub use config::{Config, ConfigError};
pub use decoding::{BoundedDecoder, DecoderState, DecodingError, GenerationTranscript};
pub use inference::{
    CausalLmProvider, GenerationConfig, IncrementalDecoder, InferenceError, InferenceProvider,
    TokenId, TokenStream, TokenizerOracle, VocabularyOracle,
};
#[cfg(any(test, feature = "mock"))]
pub use inference::mock::{MockInferenceProvider, MockTurn, MockVocabulary};
pub use pipeline::{
    BatchReport, FailureKind, JudgeSession, PairFailure, PairOrchestrator, PairOutcome,
    PairResult, PipelineError, QueryDocumentPair, SessionSettings,
};
pub use prompt::{PromptTemplate, build_prompt, format_instruction};
pub use scoring::{
    CandidateEncoding, CandidatePolicy, CandidateSet, DecisionScore, DecisionScorer, LogitView,
    Polarity, RelevanceScore, ScoringError, two_way_softmax,
};

//! Decision scoring: from a full-vocabulary logits snapshot to a yes/no probability.
//!
//! 1. [`LogitView`] resolves the tensor rank once: `[batch, vocab]` is read directly,
//!    `[batch, seq, vocab]` is read at the last sequence position. Anything else is
//!    [`ScoringError::MalformedLogitShape`].
//! 2. Every [`CandidateEncoding`] in the session's [`CandidateSet`] has its logit read at
//!    `offset + token_id`; ids past the vocabulary are [`ScoringError::TokenOutOfRange`].
//! 3. The authoritative affirmative and negative logits go through a max-shifted
//!    two-way softmax ([`two_way_softmax`]).
//!
//! # Selection Policy
//!
//! Several spellings may exist per polarity (`"Yes"`, `" yes"`, ...). All of them are
//! resolved and reported, but only the first resolved surface in [`CandidatePolicy`]
//! order enters the softmax. With the defaults that is the spelling without a leading
//! space. The policy is fixed per session so scores are reproducible.

pub mod error;
pub mod scorer;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::ScoringError;
pub use scorer::{DecisionScorer, two_way_softmax};
pub use types::{
    CandidateEncoding, CandidateLogit, CandidatePolicy, CandidateSet, DecisionScore, LogitView,
    Polarity, RelevanceScore,
};

//! Cross-cutting, shared constants.
//!
//! Policy values live here so the decoder, orchestrator and config agree on them.
//!
//! # Prompt Invariants
//!
//! The system prompt and the structural framing are part of the model contract: the
//! relevance probabilities are only comparable across runs that used the exact same
//! text. Override them through [`Config`](crate::Config) rather than editing call sites.

/// Hard cap on tokens produced by the bounded decoder.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 10;

/// Upper bound on prompt plus generated tokens for one generation context.
pub const DEFAULT_MAX_LENGTH: usize = 2048;

/// Name of the only tensor the orchestrator fetches from the provider.
pub const LOGITS_TENSOR_NAME: &str = "logits";

/// Affirmative surface forms in priority order (first resolved one is authoritative).
pub const DEFAULT_AFFIRMATIVE_SURFACES: &[&str] = &["Yes", " yes"];

/// Negative surface forms in priority order (first resolved one is authoritative).
pub const DEFAULT_NEGATIVE_SURFACES: &[&str] = &["No", " no"];

/// System instruction used by [`build_prompt`](crate::prompt::build_prompt) when none is given.
pub const DEFAULT_INSTRUCTION: &str = "Judge whether the JobDescription meets the requirements based on the Vacancy. Note that the answer can only be \"yes\" or \"no\".";

/// Characters of the document shown in per-pair report lines.
pub const REPORT_DOCUMENT_PREVIEW: usize = 100;

/// Characters of the document shown in the batch summary.
pub const SUMMARY_DOCUMENT_PREVIEW: usize = 50;

//! Inference seams: the vocabulary oracle and the inference provider.
//!
//! The judge never talks to a model or tokenizer directly. It goes through two traits:
//!
//! - [`VocabularyOracle`] maps text to token ids and hands out per-run
//!   [`IncrementalDecoder`]s for streaming detokenization.
//! - [`InferenceProvider`] owns the generation context: prime it with a prompt, read the
//!   `"logits"` tensor, then advance it one token at a time.
//!
//! [`TokenizerOracle`] and [`CausalLmProvider`] are the production implementations
//! (HuggingFace `tokenizers` + a quantized GGUF transformer on candle). Scripted doubles
//! live in [`mock`] behind `#[cfg(any(test, feature = "mock"))]`.

/// Device selection (CPU / Metal / CUDA).
pub mod device;
mod error;
pub(crate) mod model;
/// Candle-backed causal LM provider.
pub mod provider;
/// HuggingFace tokenizer oracle + streaming decoder.
pub mod tokenizer;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use error::InferenceError;
pub use provider::CausalLmProvider;
pub use tokenizer::{TokenStream, TokenizerOracle};

use candle_core::Tensor;

use crate::constants::DEFAULT_MAX_LENGTH;

/// Vocabulary entry identifier. Only meaningful for the oracle that produced it.
pub type TokenId = u32;

/// Options recognized when priming a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Upper bound on prompt plus generated tokens.
    pub max_length: usize,
    /// Whether the provider may keep output buffers from a previous context.
    pub reuse_output_buffers: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            reuse_output_buffers: false,
        }
    }
}

impl GenerationConfig {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            ..Default::default()
        }
    }
}

/// Stateful detokenizer. Feed tokens in generation order; a call may return an empty
/// fragment while a multi-token glyph is still incomplete.
pub trait IncrementalDecoder {
    fn decode(&mut self, token: TokenId) -> Result<String, InferenceError>;

    /// Emits anything still held back. Called once when the run ends.
    fn flush(&mut self) -> Result<String, InferenceError> {
        Ok(String::new())
    }
}

/// Text to token-id mapping for one model.
pub trait VocabularyOracle {
    type Decoder: IncrementalDecoder;

    /// Returns candidate segmentations of `text`; callers use the first one.
    fn encode(&self, text: &str) -> Result<Vec<Vec<TokenId>>, InferenceError>;

    /// Creates a fresh streaming decoder. Never share one across generation runs.
    fn create_incremental_decoder(&self) -> Self::Decoder;
}

/// Forward pass and stepwise generation over a single, non-reentrant context.
pub trait InferenceProvider {
    /// Resets the generation context and runs the prompt through the model.
    fn prime(
        &mut self,
        config: &GenerationConfig,
        tokens: &[TokenId],
    ) -> Result<(), InferenceError>;

    fn is_generation_complete(&self) -> bool;

    /// Returns a snapshot of a named output. Only `"logits"` is used by the judge.
    fn fetch_named_tensor(&self, name: &str) -> Result<Tensor, InferenceError>;

    /// Appends exactly one token to the context.
    fn step_generate_one_token(&mut self) -> Result<(), InferenceError>;

    /// Full token sequence (prompt + generated) of stream `index`. Only stream 0 exists.
    fn generated_sequence(&self, index: usize) -> Result<&[TokenId], InferenceError>;

    /// Drops the generation context. Called between pairs and on teardown.
    fn release(&mut self);
}

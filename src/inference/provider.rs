use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use tracing::{debug, info};

use crate::constants::LOGITS_TENSOR_NAME;

use super::error::InferenceError;
use super::model::CausalLm;
use super::{GenerationConfig, InferenceProvider, TokenId};

/// Live state of one primed sequence.
struct GenerationContext {
    sequence: Vec<TokenId>,
    prompt_len: usize,
    logits: Tensor,
    max_length: usize,
}

/// [`InferenceProvider`] backed by a quantized GGUF causal LM with greedy next-token
/// selection.
pub struct CausalLmProvider {
    model: CausalLm,
    device: Device,
    stop_tokens: Vec<TokenId>,
    sampler: LogitsProcessor,
    context: Option<GenerationContext>,
}

impl std::fmt::Debug for CausalLmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CausalLmProvider")
            .field("device", &format!("{:?}", self.device))
            .field("architecture", &self.model.config().architecture)
            .field("vocab_size", &self.model.vocab_size())
            .field("stop_tokens", &self.stop_tokens)
            .field("primed", &self.context.is_some())
            .finish()
    }
}

impl CausalLmProvider {
    /// Loads a GGUF model. `max_length` bounds the positions any context may use.
    pub fn load(
        model_path: &Path,
        max_length: usize,
        device: &Device,
    ) -> Result<Self, InferenceError> {
        if !model_path.is_file() {
            return Err(InferenceError::ModelNotFound {
                path: model_path.to_path_buf(),
            });
        }

        let mut model_file = std::fs::File::open(model_path)?;
        let content = candle_core::quantized::gguf_file::Content::read(&mut model_file)
            .map_err(|e| InferenceError::ModelLoadFailed {
                reason: format!("Failed to read GGUF content: {}", e),
            })?;

        let model = CausalLm::from_gguf(content, &mut model_file, device, max_length).map_err(
            |e| InferenceError::ModelLoadFailed {
                reason: format!("Failed to build transformer: {}", e),
            },
        )?;

        info!(
            model_path = %model_path.display(),
            architecture = %model.config().architecture,
            num_layers = model.config().num_layers,
            hidden_size = model.config().hidden_size,
            vocab_size = model.vocab_size(),
            max_positions = model.max_positions(),
            "Causal LM loaded"
        );

        Ok(Self {
            model,
            device: device.clone(),
            stop_tokens: Vec::new(),
            sampler: LogitsProcessor::from_sampling(0, Sampling::ArgMax),
            context: None,
        })
    }

    /// Tokens that end generation when produced (end-of-turn / end-of-text markers).
    pub fn with_stop_tokens(mut self, stop_tokens: Vec<TokenId>) -> Self {
        self.stop_tokens = stop_tokens;
        self
    }

    pub fn architecture(&self) -> &str {
        &self.model.config().architecture
    }

    pub fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    fn forward(&mut self, tokens: &[TokenId], seq_start: usize) -> Result<Tensor, InferenceError> {
        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        self.model
            .forward(&input, seq_start)
            .map_err(|e| InferenceError::InferenceFailed {
                reason: format!("Transformer forward pass failed: {}", e),
            })
    }
}

impl InferenceProvider for CausalLmProvider {
    fn prime(
        &mut self,
        config: &GenerationConfig,
        tokens: &[TokenId],
    ) -> Result<(), InferenceError> {
        if tokens.is_empty() {
            return Err(InferenceError::TokenizationFailed {
                reason: "prompt encoded to zero tokens".to_string(),
            });
        }
        if config.max_length > self.model.max_positions() {
            return Err(InferenceError::InvalidConfig {
                reason: format!(
                    "max_length {} exceeds the {} positions the model was loaded for",
                    config.max_length,
                    self.model.max_positions()
                ),
            });
        }
        if tokens.len() > config.max_length {
            return Err(InferenceError::ContextExhausted {
                tokens: tokens.len(),
                max_length: config.max_length,
            });
        }

        // Every prime restarts at position 0; reuse_output_buffers has no effect here.
        self.release();

        debug!(
            prompt_tokens = tokens.len(),
            max_length = config.max_length,
            reuse_output_buffers = config.reuse_output_buffers,
            "Priming generation context"
        );

        let logits = self.forward(tokens, 0)?;

        self.context = Some(GenerationContext {
            sequence: tokens.to_vec(),
            prompt_len: tokens.len(),
            logits,
            max_length: config.max_length,
        });

        Ok(())
    }

    fn is_generation_complete(&self) -> bool {
        let Some(ctx) = &self.context else {
            return true;
        };
        if ctx.sequence.len() >= ctx.max_length {
            return true;
        }
        ctx.sequence.len() > ctx.prompt_len
            && ctx
                .sequence
                .last()
                .is_some_and(|token| self.stop_tokens.contains(token))
    }

    fn fetch_named_tensor(&self, name: &str) -> Result<Tensor, InferenceError> {
        if name != LOGITS_TENSOR_NAME {
            return Err(InferenceError::UnknownTensor {
                name: name.to_string(),
            });
        }
        let ctx = self.context.as_ref().ok_or(InferenceError::NotPrimed)?;
        Ok(ctx.logits.clone())
    }

    fn step_generate_one_token(&mut self) -> Result<(), InferenceError> {
        if self.context.is_none() {
            return Err(InferenceError::NotPrimed);
        }
        if self.is_generation_complete() {
            return Err(InferenceError::GenerationComplete);
        }

        let (next, position) = {
            let Some(ctx) = self.context.as_ref() else {
                return Err(InferenceError::NotPrimed);
            };
            let last = ctx.logits.flatten_all()?.to_dtype(DType::F32)?;
            let next = self.sampler.sample(&last)?;
            (next, ctx.sequence.len())
        };

        let logits = self.forward(&[next], position)?;

        if let Some(ctx) = self.context.as_mut() {
            ctx.sequence.push(next);
            ctx.logits = logits;
        }

        Ok(())
    }

    fn generated_sequence(&self, index: usize) -> Result<&[TokenId], InferenceError> {
        if index != 0 {
            return Err(InferenceError::SequenceOutOfRange { index });
        }
        let ctx = self.context.as_ref().ok_or(InferenceError::NotPrimed)?;
        Ok(&ctx.sequence)
    }

    fn release(&mut self) {
        self.context = None;
        self.model.clear_kv_cache();
    }
}

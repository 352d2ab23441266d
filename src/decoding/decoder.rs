use serde::Serialize;
use tracing::{debug, info};

use crate::constants::DEFAULT_MAX_NEW_TOKENS;
use crate::inference::{IncrementalDecoder, InferenceError, InferenceProvider};

use super::DecoderState;
use super::error::DecodingError;

/// Literal answer produced by a [`BoundedDecoder`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationTranscript {
    /// Concatenated fragments, whitespace-trimmed.
    pub text: String,
    /// Raw fragments in generation order, one per generated token plus the final flush.
    pub fragments: Vec<String>,
    pub tokens_generated: usize,
    /// `Done` or `Capped`.
    pub state: DecoderState,
}

impl GenerationTranscript {
    pub fn was_capped(&self) -> bool {
        self.state == DecoderState::Capped
    }
}

/// Token-capped greedy generation loop over a primed provider.
///
/// Each step first asks the provider whether it is finished (`Done`), then checks the
/// cap (`Capped`), and only then generates and detokenizes one token. The cap bounds the
/// loop no matter what the model does.
#[derive(Debug, Clone)]
pub struct BoundedDecoder {
    cap: usize,
    state: DecoderState,
    tokens_generated: usize,
    fragments: Vec<String>,
}

impl Default for BoundedDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NEW_TOKENS)
    }
}

impl BoundedDecoder {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            state: DecoderState::Ready,
            tokens_generated: 0,
            fragments: Vec::new(),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn tokens_generated(&self) -> usize {
        self.tokens_generated
    }

    /// Advances the state machine by one transition.
    pub fn step<P, D>(
        &mut self,
        provider: &mut P,
        stream: &mut D,
    ) -> Result<DecoderState, DecodingError>
    where
        P: InferenceProvider + ?Sized,
        D: IncrementalDecoder + ?Sized,
    {
        if self.state.is_terminal() {
            return Err(DecodingError::Finished { state: self.state });
        }

        if provider.is_generation_complete() {
            self.state = DecoderState::Done;
            return Ok(self.state);
        }

        if self.tokens_generated >= self.cap {
            self.state = DecoderState::Capped;
            return Ok(self.state);
        }

        self.state = DecoderState::Generating;
        let step = self.tokens_generated;
        let wrap = |source: InferenceError| DecodingError::Step { step, source };

        provider.step_generate_one_token().map_err(wrap)?;
        let token = provider
            .generated_sequence(0)
            .map_err(wrap)?
            .last()
            .copied()
            .ok_or_else(|| wrap(InferenceError::SequenceOutOfRange { index: 0 }))?;

        let fragment = stream.decode(token).map_err(DecodingError::Detokenize)?;
        debug!(step, token, fragment = ?fragment, "Generated token");

        self.fragments.push(fragment);
        self.tokens_generated += 1;
        Ok(self.state)
    }

    /// Steps until `Done` or `Capped`, then flushes the stream.
    pub fn run<P, D>(
        mut self,
        provider: &mut P,
        mut stream: D,
    ) -> Result<GenerationTranscript, DecodingError>
    where
        P: InferenceProvider + ?Sized,
        D: IncrementalDecoder,
    {
        while !self.step(provider, &mut stream)?.is_terminal() {}

        let tail = stream.flush().map_err(DecodingError::Detokenize)?;
        if !tail.is_empty() {
            self.fragments.push(tail);
        }

        let text = self.fragments.concat().trim().to_string();

        info!(
            state = %self.state,
            tokens = self.tokens_generated,
            cap = self.cap,
            "Generation finished"
        );

        Ok(GenerationTranscript {
            text,
            fragments: self.fragments,
            tokens_generated: self.tokens_generated,
            state: self.state,
        })
    }
}

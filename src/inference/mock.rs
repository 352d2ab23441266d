//! Scripted vocabulary and provider for tests.
//!
//! [`MockVocabulary`] knows a handful of whole-word pieces (the default yes/no surfaces)
//! and falls back to one token per character. [`MockInferenceProvider`] replays one
//! [`MockTurn`] per prime: a fixed logits tensor, a token script, and an optional point
//! at which it reports completion.

use std::collections::{HashMap, VecDeque};

use candle_core::{Device, Tensor};

use super::error::InferenceError;
use super::{GenerationConfig, IncrementalDecoder, InferenceProvider, TokenId, VocabularyOracle};

pub const MOCK_VOCAB_SIZE: usize = 1024;
pub const MOCK_YES: TokenId = 10;
pub const MOCK_YES_SPACED: TokenId = 11;
pub const MOCK_NO: TokenId = 20;
pub const MOCK_NO_SPACED: TokenId = 21;
pub const MOCK_END: TokenId = 2;

const CHAR_BASE: TokenId = 100;

#[derive(Debug, Clone)]
pub struct MockVocabulary {
    pieces: HashMap<String, Vec<TokenId>>,
    names: HashMap<TokenId, String>,
}

impl Default for MockVocabulary {
    fn default() -> Self {
        let mut vocab = Self {
            pieces: HashMap::new(),
            names: HashMap::new(),
        };
        vocab.insert("Yes", vec![MOCK_YES]);
        vocab.insert(" yes", vec![MOCK_YES_SPACED]);
        vocab.insert("No", vec![MOCK_NO]);
        vocab.insert(" no", vec![MOCK_NO_SPACED]);
        vocab.insert("<|end|>", vec![MOCK_END]);
        vocab
    }
}

impl MockVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the segmentation of `surface`, e.g. to make it span several tokens.
    pub fn with_piece(mut self, surface: &str, ids: Vec<TokenId>) -> Self {
        self.insert(surface, ids);
        self
    }

    fn insert(&mut self, surface: &str, ids: Vec<TokenId>) {
        if let [id] = ids.as_slice() {
            self.names.insert(*id, surface.to_string());
        }
        self.pieces.insert(surface.to_string(), ids);
    }

    fn char_token(c: char) -> TokenId {
        CHAR_BASE + (c as TokenId) % (MOCK_VOCAB_SIZE as TokenId - CHAR_BASE)
    }

    /// Registered surface, the character for ASCII character tokens, else `<id>`.
    pub fn token_text(&self, token: TokenId) -> String {
        if let Some(name) = self.names.get(&token) {
            return name.clone();
        }
        match token
            .checked_sub(CHAR_BASE)
            .and_then(char::from_u32)
            .filter(char::is_ascii)
        {
            Some(c) => c.to_string(),
            None => format!("<{token}>"),
        }
    }
}

impl VocabularyOracle for MockVocabulary {
    type Decoder = MockStream;

    fn encode(&self, text: &str) -> Result<Vec<Vec<TokenId>>, InferenceError> {
        if let Some(ids) = self.pieces.get(text) {
            return Ok(vec![ids.clone()]);
        }
        Ok(vec![text.chars().map(Self::char_token).collect()])
    }

    fn create_incremental_decoder(&self) -> MockStream {
        MockStream {
            vocab: self.clone(),
            decoded: Vec::new(),
        }
    }
}

/// Decodes each token to its registered surface; the end marker decodes to nothing.
#[derive(Debug)]
pub struct MockStream {
    vocab: MockVocabulary,
    decoded: Vec<TokenId>,
}

impl MockStream {
    pub fn decoded(&self) -> &[TokenId] {
        &self.decoded
    }
}

impl IncrementalDecoder for MockStream {
    fn decode(&mut self, token: TokenId) -> Result<String, InferenceError> {
        self.decoded.push(token);
        if token == MOCK_END {
            return Ok(String::new());
        }
        Ok(self.vocab.token_text(token))
    }
}

/// Logits a turn hands out on fetch.
#[derive(Debug, Clone)]
pub enum MockLogits {
    /// `[1, vocab]` with the given yes/no logits, built on fetch.
    YesNo { yes: f32, no: f32 },
    Tensor(Tensor),
}

impl MockLogits {
    fn to_tensor(&self) -> candle_core::Result<Tensor> {
        match self {
            Self::YesNo { yes, no } => yes_no_logits(*yes, *no, &[1, MOCK_VOCAB_SIZE]),
            Self::Tensor(tensor) => Ok(tensor.clone()),
        }
    }
}

/// One scripted generation run.
#[derive(Debug, Clone)]
pub struct MockTurn {
    pub logits: MockLogits,
    pub script: Vec<TokenId>,
    /// Report completion after this many generated tokens; `None` never completes.
    pub complete_after: Option<usize>,
    /// Fail the forward pass on prime.
    pub fail_prime: bool,
}

impl MockTurn {
    /// A `[1, vocab]` logits vector with the given yes/no logits and zeros elsewhere.
    pub fn yes_no(yes_logit: f32, no_logit: f32) -> Self {
        Self::from_logits(MockLogits::YesNo {
            yes: yes_logit,
            no: no_logit,
        })
    }

    pub fn with_logits(logits: Tensor) -> Self {
        Self::from_logits(MockLogits::Tensor(logits))
    }

    fn from_logits(logits: MockLogits) -> Self {
        Self {
            logits,
            script: Vec::new(),
            complete_after: Some(0),
            fail_prime: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_prime: true,
            ..Self::yes_no(0.0, 0.0)
        }
    }

    pub fn script(mut self, script: Vec<TokenId>) -> Self {
        self.complete_after = Some(script.len());
        self.script = script;
        self
    }

    pub fn complete_after(mut self, tokens: Option<usize>) -> Self {
        self.complete_after = tokens;
        self
    }
}

/// Builds a logits tensor of `shape` (rank 2 or 3) whose last-position slice holds
/// `yes_logit` at [`MOCK_YES`] and `no_logit` at [`MOCK_NO`]. Earlier positions hold
/// the inverse so reading the wrong slice flips the verdict.
///
/// Fails when `shape` has no room for both ids in its last dimension.
pub fn yes_no_logits(
    yes_logit: f32,
    no_logit: f32,
    shape: &[usize],
) -> candle_core::Result<Tensor> {
    let vocab = shape.last().copied().unwrap_or(0);
    let needed = MOCK_YES.max(MOCK_NO) as usize + 1;
    if vocab < needed {
        candle_core::bail!("mock logits shape {shape:?} needs a vocabulary of at least {needed}");
    }
    let total: usize = shape.iter().product();
    let mut data = vec![0.0f32; total];
    let last_offset = total.saturating_sub(vocab);
    for offset in (0..total).step_by(vocab) {
        let (yes, no) = if offset == last_offset {
            (yes_logit, no_logit)
        } else {
            (no_logit, yes_logit)
        };
        data[offset + MOCK_YES as usize] = yes;
        data[offset + MOCK_NO as usize] = no;
    }
    Tensor::from_vec(data, shape, &Device::Cpu)
}

#[derive(Debug, Default)]
pub struct MockInferenceProvider {
    turns: VecDeque<MockTurn>,
    current: Option<MockTurn>,
    sequence: Vec<TokenId>,
    generated: usize,
    pub primed_with: Vec<Vec<TokenId>>,
    pub configs: Vec<GenerationConfig>,
    pub release_count: usize,
}

impl MockInferenceProvider {
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: turns.into(),
            ..Default::default()
        }
    }

    /// Same turn for every prime.
    pub fn repeating(turn: MockTurn) -> Self {
        Self::new(vec![turn])
    }

    pub fn generated_count(&self) -> usize {
        self.generated
    }
}

impl InferenceProvider for MockInferenceProvider {
    fn prime(
        &mut self,
        config: &GenerationConfig,
        tokens: &[TokenId],
    ) -> Result<(), InferenceError> {
        self.primed_with.push(tokens.to_vec());
        self.configs.push(*config);

        let turn = if self.turns.len() > 1 {
            self.turns.pop_front()
        } else {
            self.turns.front().cloned()
        }
        .ok_or(InferenceError::NotPrimed)?;

        if turn.fail_prime {
            return Err(InferenceError::InferenceFailed {
                reason: "scripted forward pass failure".to_string(),
            });
        }

        self.sequence = tokens.to_vec();
        self.generated = 0;
        self.current = Some(turn);
        Ok(())
    }

    fn is_generation_complete(&self) -> bool {
        match &self.current {
            Some(turn) => turn
                .complete_after
                .is_some_and(|limit| self.generated >= limit),
            None => true,
        }
    }

    fn fetch_named_tensor(&self, name: &str) -> Result<Tensor, InferenceError> {
        if name != crate::constants::LOGITS_TENSOR_NAME {
            return Err(InferenceError::UnknownTensor {
                name: name.to_string(),
            });
        }
        let turn = self.current.as_ref().ok_or(InferenceError::NotPrimed)?;
        Ok(turn.logits.to_tensor()?)
    }

    fn step_generate_one_token(&mut self) -> Result<(), InferenceError> {
        let turn = self.current.as_ref().ok_or(InferenceError::NotPrimed)?;
        // Past the end of the script the mock keeps emitting a filler character.
        let token = turn
            .script
            .get(self.generated)
            .copied()
            .unwrap_or_else(|| MockVocabulary::char_token('.'));
        self.sequence.push(token);
        self.generated += 1;
        Ok(())
    }

    fn generated_sequence(&self, index: usize) -> Result<&[TokenId], InferenceError> {
        if index != 0 {
            return Err(InferenceError::SequenceOutOfRange { index });
        }
        if self.current.is_none() {
            return Err(InferenceError::NotPrimed);
        }
        Ok(&self.sequence)
    }

    fn release(&mut self) {
        self.current = None;
        self.sequence.clear();
        self.release_count += 1;
    }
}

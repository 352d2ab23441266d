use std::path::Path;
use std::sync::Arc;

use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::error::InferenceError;
use super::{IncrementalDecoder, TokenId, VocabularyOracle};

/// Loads `tokenizer.json` from a directory, an explicit file, or next to a model file.
pub fn load_tokenizer(path: &Path) -> Result<Tokenizer, InferenceError> {
    let tokenizer_path = if path
        .file_name()
        .is_some_and(|name| name == std::ffi::OsStr::new("tokenizer.json"))
    {
        path.to_path_buf()
    } else if path.is_dir() {
        path.join("tokenizer.json")
    } else {
        path.parent()
            .ok_or_else(|| InferenceError::ModelNotFound {
                path: path.to_path_buf(),
            })?
            .join("tokenizer.json")
    };

    if !tokenizer_path.exists() {
        return Err(InferenceError::ModelNotFound {
            path: tokenizer_path,
        });
    }

    Tokenizer::from_file(&tokenizer_path).map_err(|e| InferenceError::ModelLoadFailed {
        reason: format!("Failed to load tokenizer: {}", e),
    })
}

/// [`VocabularyOracle`] over a HuggingFace tokenizer.
#[derive(Clone)]
pub struct TokenizerOracle {
    tokenizer: Arc<Tokenizer>,
    add_special_tokens: bool,
}

impl std::fmt::Debug for TokenizerOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerOracle")
            .field("vocab_size", &self.vocab_size())
            .field("add_special_tokens", &self.add_special_tokens)
            .finish()
    }
}

impl TokenizerOracle {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let tokenizer = load_tokenizer(path)?;
        info!(
            path = %path.display(),
            vocab_size = tokenizer.get_vocab_size(true),
            "Tokenizer loaded"
        );
        Ok(Self::new(tokenizer))
    }

    /// Wraps a tokenizer. Prompts carry their own turn markers, so the tokenizer's
    /// post-processor (BOS/EOS insertion) is off by default.
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer: Arc::new(tokenizer),
            add_special_tokens: false,
        }
    }

    pub fn with_special_tokens(mut self, add_special_tokens: bool) -> Self {
        self.add_special_tokens = add_special_tokens;
        self
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Looks up a single vocabulary entry, including added special tokens.
    pub fn token_id(&self, token: &str) -> Option<TokenId> {
        self.tokenizer.token_to_id(token)
    }
}

impl VocabularyOracle for TokenizerOracle {
    type Decoder = TokenStream;

    fn encode(&self, text: &str) -> Result<Vec<Vec<TokenId>>, InferenceError> {
        let encoding = self
            .tokenizer
            .encode(text, self.add_special_tokens)
            .map_err(|e| InferenceError::TokenizationFailed {
                reason: e.to_string(),
            })?;

        debug!(
            text_len = text.len(),
            token_count = encoding.len(),
            "Encoded text"
        );

        Ok(vec![encoding.get_ids().to_vec()])
    }

    fn create_incremental_decoder(&self) -> TokenStream {
        TokenStream::new(Arc::clone(&self.tokenizer))
    }
}

/// Streaming detokenizer.
///
/// Re-decodes the window of tokens since the last emitted fragment and only emits the
/// new suffix once it no longer ends in a replacement character, so byte-level pieces of
/// a multi-byte glyph are held back until the glyph is complete.
pub struct TokenStream {
    tokenizer: Arc<Tokenizer>,
    tokens: Vec<TokenId>,
    prev_index: usize,
    current_index: usize,
}

impl TokenStream {
    pub fn new(tokenizer: Arc<Tokenizer>) -> Self {
        Self {
            tokenizer,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    fn decode_window(&self, start: usize, end: usize) -> Result<String, InferenceError> {
        self.tokenizer
            .decode(&self.tokens[start..end], true)
            .map_err(|e| InferenceError::TokenizationFailed {
                reason: e.to_string(),
            })
    }
}

impl IncrementalDecoder for TokenStream {
    fn decode(&mut self, token: TokenId) -> Result<String, InferenceError> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            self.decode_window(self.prev_index, self.current_index)?
        };

        self.tokens.push(token);
        let text = self.decode_window(self.prev_index, self.tokens.len())?;

        if text.len() > prev_text.len() && !text.ends_with('\u{FFFD}') {
            let fragment = match text.get(prev_text.len()..) {
                Some(suffix) => suffix.to_string(),
                None => text.clone(),
            };
            self.prev_index = self.current_index;
            self.current_index = self.tokens.len();
            Ok(fragment)
        } else {
            Ok(String::new())
        }
    }

    fn flush(&mut self) -> Result<String, InferenceError> {
        if self.current_index >= self.tokens.len() {
            return Ok(String::new());
        }
        let prev_text = self.decode_window(self.prev_index, self.current_index)?;
        let text = self.decode_window(self.prev_index, self.tokens.len())?;
        self.prev_index = self.tokens.len();
        self.current_index = self.tokens.len();
        Ok(text.get(prev_text.len()..).unwrap_or_default().to_string())
    }
}

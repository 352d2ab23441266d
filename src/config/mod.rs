//! Environment-backed configuration.
//!
//! Every setting has a default. Override with `JUDGE_*` environment variables.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_AFFIRMATIVE_SURFACES, DEFAULT_MAX_LENGTH, DEFAULT_MAX_NEW_TOKENS,
    DEFAULT_NEGATIVE_SURFACES,
};
use crate::inference::GenerationConfig;
use crate::prompt::PromptTemplate;
use crate::scoring::CandidatePolicy;

/// Judge configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `JUDGE_*` overrides on top of defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// GGUF model file. Default: `./models/phi-4-mini-instruct-q4_k_m.gguf`.
    pub model_path: PathBuf,

    /// `tokenizer.json` path. Default: next to the model file.
    pub tokenizer_path: Option<PathBuf>,

    /// Prompt plus generated tokens. Default: `2048`.
    pub max_length: usize,

    /// Bounded decoder cap. Default: `10`.
    pub max_new_tokens: usize,

    /// Turn delimiters. Default: inferred from the GGUF architecture.
    pub template: Option<PromptTemplate>,

    /// Ordered affirmative surfaces. Default: `"Yes"`, `" yes"`.
    pub affirmative: Vec<String>,

    /// Ordered negative surfaces. Default: `"No"`, `" no"`.
    pub negative: Vec<String>,

    /// System instruction override.
    pub instruction: Option<String>,
}

/// Model file used when `JUDGE_MODEL_PATH` is not set.
pub const DEFAULT_MODEL_PATH: &str = "./models/phi-4-mini-instruct-q4_k_m.gguf";

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            tokenizer_path: None,
            max_length: DEFAULT_MAX_LENGTH,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            template: None,
            affirmative: to_owned(DEFAULT_AFFIRMATIVE_SURFACES),
            negative: to_owned(DEFAULT_NEGATIVE_SURFACES),
            instruction: None,
        }
    }
}

impl Config {
    const ENV_MODEL_PATH: &'static str = "JUDGE_MODEL_PATH";
    const ENV_TOKENIZER_PATH: &'static str = "JUDGE_TOKENIZER_PATH";
    const ENV_MAX_LENGTH: &'static str = "JUDGE_MAX_LENGTH";
    const ENV_MAX_NEW_TOKENS: &'static str = "JUDGE_MAX_NEW_TOKENS";
    const ENV_TEMPLATE: &'static str = "JUDGE_TEMPLATE";
    const ENV_AFFIRMATIVE: &'static str = "JUDGE_AFFIRMATIVE";
    const ENV_NEGATIVE: &'static str = "JUDGE_NEGATIVE";
    const ENV_INSTRUCTION: &'static str = "JUDGE_INSTRUCTION";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let model_path = Self::parse_path_from_env(Self::ENV_MODEL_PATH, defaults.model_path);
        let tokenizer_path = Self::parse_optional_path_from_env(Self::ENV_TOKENIZER_PATH);
        let max_length = Self::parse_usize_from_env(Self::ENV_MAX_LENGTH, defaults.max_length)?;
        let max_new_tokens =
            Self::parse_usize_from_env(Self::ENV_MAX_NEW_TOKENS, defaults.max_new_tokens)?;
        let template = Self::parse_template_from_env()?;
        let affirmative = Self::parse_list_from_env(Self::ENV_AFFIRMATIVE, defaults.affirmative);
        let negative = Self::parse_list_from_env(Self::ENV_NEGATIVE, defaults.negative);
        let instruction = env::var(Self::ENV_INSTRUCTION)
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            model_path,
            tokenizer_path,
            max_length,
            max_new_tokens,
            template,
            affirmative,
            negative,
            instruction,
        })
    }

    /// Validates paths and ranges without loading anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_file(&self.model_path)?;
        Self::require_file(&self.tokenizer_path())?;

        if self.max_length == 0 {
            return Err(ConfigError::InvalidValue {
                name: Self::ENV_MAX_LENGTH,
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.max_new_tokens >= self.max_length {
            return Err(ConfigError::InvalidValue {
                name: Self::ENV_MAX_NEW_TOKENS,
                reason: format!(
                    "{} leaves no room for a prompt within max_length {}",
                    self.max_new_tokens, self.max_length
                ),
            });
        }

        for (name, surfaces) in [
            (Self::ENV_AFFIRMATIVE, &self.affirmative),
            (Self::ENV_NEGATIVE, &self.negative),
        ] {
            if surfaces.is_empty() {
                return Err(ConfigError::InvalidValue {
                    name,
                    reason: "at least one surface form is required".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Explicit tokenizer path, or `tokenizer.json` beside the model.
    pub fn tokenizer_path(&self) -> PathBuf {
        match &self.tokenizer_path {
            Some(path) => path.clone(),
            None => self
                .model_path
                .parent()
                .map(|dir| dir.join("tokenizer.json"))
                .unwrap_or_else(|| PathBuf::from("tokenizer.json")),
        }
    }

    /// Generation options for every prime. Output buffers are never reused across pairs.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::new(self.max_length)
    }

    pub fn candidate_policy(&self) -> CandidatePolicy {
        CandidatePolicy::new(self.affirmative.clone(), self.negative.clone())
    }

    fn require_file(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Err(ConfigError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        if !path.is_file() {
            return Err(ConfigError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        Self::parse_optional_path_from_env(var_name).unwrap_or(default)
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn parse_usize_from_env(
        var_name: &'static str,
        default: usize,
    ) -> Result<usize, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.trim().parse().map_err(|e| ConfigError::ParseInt {
                name: var_name,
                value,
                source: e,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_template_from_env() -> Result<Option<PromptTemplate>, ConfigError> {
        match env::var(Self::ENV_TEMPLATE) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => value
                .parse()
                .map(Some)
                .map_err(|reason| ConfigError::InvalidTemplate {
                    name: Self::ENV_TEMPLATE,
                    reason,
                }),
            Err(_) => Ok(None),
        }
    }

    /// Comma-separated, order-preserving. Entries are not trimmed so a leading space
    /// survives; empty entries are dropped.
    fn parse_list_from_env(var_name: &str, default: Vec<String>) -> Vec<String> {
        match env::var(var_name) {
            Ok(value) => value
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => default,
        }
    }
}

fn to_owned(surfaces: &[&str]) -> Vec<String> {
    surfaces.iter().map(|s| s.to_string()).collect()
}

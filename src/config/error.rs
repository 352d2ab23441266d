//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric variable could not be parsed.
    #[error("failed to parse {name}='{value}': {source}")]
    ParseInt {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// `JUDGE_TEMPLATE` names an unknown convention.
    #[error("invalid {name}: {reason}")]
    InvalidTemplate { name: &'static str, reason: String },

    /// A value parsed but is outside its accepted range.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    /// Specified path does not exist on the filesystem.
    #[error("path does not exist: {path}")]
    PathNotFound { path: PathBuf },

    /// Path exists but is not a file (when a file was expected).
    #[error("path is not a file: {path}")]
    NotAFile { path: PathBuf },
}

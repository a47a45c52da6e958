//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to parse release version '{value}': {source}")]
    ParsingFailed {
        value: String,
        #[source]
        source: semver::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl CoreError {
    /// Shorthand for configuration errors
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

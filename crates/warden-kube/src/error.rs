//! Error types for admission handling

use thiserror::Error;
use warden_core::CoreError;

/// Result type for admission operations
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Message returned to the caller for every internal failure
pub const INTERNAL_ERROR_MESSAGE: &str = "admission failed due to an internal error";

/// Errors that can occur while admitting a request
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdmissionError {
    /// Business-rule rejection, shown to the caller as is
    #[error("{0}")]
    NotAllowed(String),

    /// Malformed input such as an unparsable release label
    #[error("{0}")]
    ParsingFailed(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other unexpected failure
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<serde_json::Error> for AdmissionError {
    fn from(e: serde_json::Error) -> Self {
        AdmissionError::Serialization(e.to_string())
    }
}

impl From<CoreError> for AdmissionError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::ParsingFailed { .. } => AdmissionError::ParsingFailed(e.to_string()),
            CoreError::InvalidConfig(msg) => AdmissionError::InvalidConfig(msg),
            CoreError::JsonParse(e) => AdmissionError::Serialization(e.to_string()),
        }
    }
}

impl AdmissionError {
    pub fn not_allowed(message: impl Into<String>) -> Self {
        AdmissionError::NotAllowed(message.into())
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        AdmissionError::ExecutionFailed(message.into())
    }

    /// Whether the message may be shown to the requester
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AdmissionError::NotAllowed(_) | AdmissionError::ParsingFailed(_)
        )
    }

    /// Message returned to the requester
    pub fn public_message(&self) -> String {
        if self.is_user_facing() {
            self.to_string()
        } else {
            INTERNAL_ERROR_MESSAGE.to_string()
        }
    }
}

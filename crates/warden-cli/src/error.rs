//! CLI error types with exit code handling

use miette::Diagnostic;
use thiserror::Error;
use warden_core::CoreError;
use warden_kube::AdmissionError;

use crate::exit_codes;

/// Startup and serving failures of the binary
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// A flag or environment variable is invalid
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(warden::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The Kubernetes client could not be built
    #[error("Kubernetes client error: {message}")]
    #[diagnostic(
        code(warden::cli::kube),
        help("check KUBECONFIG or the in-cluster service account")
    )]
    Kube { message: String },

    /// TLS material could not be loaded
    #[error("TLS error: {message}")]
    #[diagnostic(code(warden::cli::tls))]
    Tls { message: String },

    /// IO error (bind failure, unreadable file, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(warden::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(warden::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Kube { .. } => exit_codes::UNAVAILABLE,
            CliError::Tls { .. } | CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidConfig(message) => CliError::config(message),
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<AdmissionError> for CliError {
    fn from(err: AdmissionError) -> Self {
        CliError::Kube {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::config("bad").exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(
            CliError::Tls { message: "no key".into() }.exit_code(),
            exit_codes::IO_ERROR
        );
        assert_eq!(CliError::internal("boom").exit_code(), exit_codes::ERROR);
    }

    #[test]
    fn test_invalid_config_keeps_message() {
        let err: CliError = CoreError::invalid_config("no zones configured").into();
        assert_eq!(err.to_string(), "Invalid configuration: no zones configured");
    }
}

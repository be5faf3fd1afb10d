//! Error types for coderun

use thiserror::Error;

/// Result type alias using coderun's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for coderun
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No interpreter candidate passed its version check
    #[error("No working interpreter found (tried: {0}). Install Python 3 and make sure it is on PATH")]
    InterpreterUnavailable(String),

    /// The interpreter could not be launched
    #[error("Failed to start interpreter '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// Input delivered to a session without a live process
    #[error("No active process for session '{0}'")]
    NoActiveProcess(String),

    /// The running process no longer accepts input
    #[error("Standard input closed for session '{0}'")]
    StdinClosed(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::NoActiveProcess(_)
                | Error::StdinClosed(_)
                | Error::Json(_)
        )
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("run task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::NoActiveProcess("s1".into()).is_client_error());
        assert!(Error::InvalidInput("empty".into()).is_client_error());
        assert!(!Error::Internal("boom".into()).is_client_error());
        assert!(Error::Io(std::io::Error::other("pipe")).is_retryable());
        assert!(!Error::NoActiveProcess("s1".into()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::NoActiveProcess("abc".into());
        assert_eq!(err.to_string(), "No active process for session 'abc'");

        let err = Error::Spawn {
            program: "python3".into(),
            reason: "not found".into(),
        };
        assert!(err.to_string().contains("python3"));
    }
}

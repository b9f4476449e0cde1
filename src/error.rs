//! Error types and exit codes for classpulse

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for classpulse operations
#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Session not found: {code}")]
    NotFound { code: String },

    /// Feedback aimed at a session that cannot accept it. Never surfaced over
    /// HTTP; the socket layer turns it into a rejection event.
    #[error("Feedback for {code} ignored: {reason}")]
    StaleWriteIgnored { code: String, reason: String },

    #[error("Could not allocate a unique session code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: usize },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PulseError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>) -> Self {
        Self::NotFound { code: code.into() }
    }

    /// Convert error to an exit code for the CLI:
    /// - 1: IO / configuration error
    /// - 2: Validation failure
    /// - 3: Unknown session
    /// - 4: Storage failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) | Self::Config { .. } => ExitCode::from(1),
            Self::Validation { .. } => ExitCode::from(2),
            Self::NotFound { .. } | Self::StaleWriteIgnored { .. } => ExitCode::from(3),
            Self::Storage { .. } | Self::CodeSpaceExhausted { .. } => ExitCode::from(4),
        }
    }
}

impl From<rusqlite::Error> for PulseError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

/// Result type alias for classpulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

//! # Error Types
//!
//! Custom error types for bfv-link using `thiserror`.

use thiserror::Error;

/// Main error type for bfv-link
#[derive(Debug, Error)]
pub enum BfvError {
    /// A decimal or hexadecimal token could not be parsed
    #[error("Invalid number {input:?}: {reason}")]
    InvalidNumber {
        /// Offending token
        input: String,
        /// Parser message
        reason: String,
    },

    /// PMTK checksum precondition violated (`$` or `!` inside the code)
    #[error("Cannot compute PMTK checksum for {code:?}")]
    Checksum {
        /// Command code that failed
        code: String,
    },

    /// Malformed `$PMTKLOX` line or record, or out-of-sequence session line
    #[error("Locus log error: {0}")]
    Locus(String),

    /// No command or parameter registered under that name
    #[error("Unknown command or parameter: {0}")]
    UnknownCommand(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// None of the candidate device paths could be opened
    #[error("No vario found, tried: {0}")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BfvError {
    pub(crate) fn invalid_number(input: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidNumber {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for bfv-link
pub type Result<T> = std::result::Result<T, BfvError>;

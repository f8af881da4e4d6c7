//! Centralized error types for mailconv.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailconv library.
#[derive(Error, Debug)]
pub enum MailError {
    /// The caller used an API in a way its contract forbids
    /// (e.g. focusing a view on an item it does not hold).
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// A read or write against the persistent store failed.
    #[error("Store {operation} failed: {reason}")]
    Store {
        operation: &'static str,
        reason: String,
    },

    /// A view request could not be delivered to its provider.
    #[error("Transport closed: {0}")]
    Transport(String),

    /// A resident ordered index lost sortedness or uniqueness.
    #[error("Index invariant violated: {0}")]
    IndexInvariant(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified message file does not exist.
    #[error("Message file not found: {0}")]
    FileNotFound(PathBuf),

    /// The bytes could not be parsed as an RFC 5322 message.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Store` variant for the given operation.
    pub fn store(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Store {
            operation,
            reason: reason.into(),
        }
    }
}

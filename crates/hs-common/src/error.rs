//! Error types for hostsnap.
//!
//! The two core operations (`resolve_os_identity`, `snapshot_processes`)
//! never fail: degraded sources produce mostly-empty records, not errors.
//! This type covers the remaining caller-facing failures, which are
//! confined to the output layer (serialization, terminal I/O) and to
//! argument validation in the CLI.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for hostsnap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// File I/O and serialization errors.
    Io,
    /// Invalid caller-supplied arguments.
    Usage,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Usage => write!(f, "usage"),
        }
    }
}

/// Caller-facing error for hostsnap operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Category for error grouping in logs and exit-code mapping.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io(_) | Error::Serialize(_) => ErrorCategory::Io,
            Error::InvalidArgument(_) => ErrorCategory::Usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::InvalidArgument("bad pid list".to_string());
        assert_eq!(err.category(), ErrorCategory::Usage);

        let err = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument("bad pid list".to_string());
        assert_eq!(err.to_string(), "invalid argument: bad pid list");
    }
}

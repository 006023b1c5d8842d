//! Error types for catalogue massaging.
//!
//! This module provides the [`MassageError`] type for all library operations
//! and the [`Result`] convenience type.
//!
//! Only transport-level failures and structurally unreadable input surface as
//! errors. Business-data problems (a non-numeric title number, a bad copy
//! number, an unknown branch, a malformed due date) are logged and skipped by
//! the enrichment engine and never reach this type.

use thiserror::Error;

/// Error type for all catalogue massaging operations.
#[derive(Error, Debug)]
pub enum MassageError {
    /// Error indicating an invalid or malformed MARC record.
    #[error("Invalid MARC record: {0}")]
    InvalidRecord(String),

    /// Error indicating an invalid leader (24-byte header).
    #[error("Invalid leader: {0}")]
    InvalidLeader(String),

    /// Error indicating an invalid field structure.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// A record too long for the five-digit ISO 2709 record length.
    #[error("Record length {0} exceeds ISO 2709 limit")]
    RecordTooLong(usize),

    /// Error during parsing or serializing of MARC data.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The item ledger ended in the middle of a value.
    #[error("Ledger decode error: {0}")]
    LedgerDecode(String),

    /// A worker thread failed or disconnected.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// IO error from the underlying source/destination.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MassageError {
    /// Whether retrying the same unit of work on a fresh handle may succeed.
    ///
    /// Only I/O failures qualify; malformed data fails the same way every time.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, MassageError::IoError(_))
    }
}

/// Convenience type alias for [`std::result::Result`] with [`MassageError`].
pub type Result<T> = std::result::Result<T, MassageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_transient() {
        let err = MassageError::from(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "seek failed",
        ));
        assert!(err.is_transient());
        assert!(!MassageError::LedgerDecode("eof".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = MassageError::LedgerDecode("unexpected end of stream".to_string());
        assert_eq!(
            format!("{err}"),
            "Ledger decode error: unexpected end of stream"
        );
    }
}

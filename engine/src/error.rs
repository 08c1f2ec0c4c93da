//! Error types for the Quadrant engine.
//!
//! Concurrent-edit outcomes are deliberately absent from this taxonomy:
//! they are resolved silently by the conflict resolver and never surface
//! as errors. Sync-path failures are caught at the pipeline boundary and
//! reported through the engine's status channel; they are never thrown
//! into the caller of a local CRUD operation.

use crate::RecordId;
use thiserror::Error;

/// All possible errors from the Quadrant engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed payload, rejected before any local mutation.
    #[error("invalid {kind} payload: {reason}")]
    Validation { kind: &'static str, reason: String },

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// The remote endpoint could not be reached or answered with a
    /// transport-level failure. Dirty and tombstoned state is preserved
    /// untouched for the next trigger.
    #[error("remote unreachable: {0}")]
    NetworkUnreachable(String),

    /// A local store transaction aborted. Only the current operation is
    /// affected; it is retried on the next trigger.
    #[error("local transaction failed: {0}")]
    StorageTransaction(String),

    /// The session is gone. Closes the sync gate until re-authentication.
    #[error("session expired or missing")]
    AuthExpired,
}

impl Error {
    pub(crate) fn validation(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::validation("tasks", "title must not be empty");
        assert_eq!(
            err.to_string(),
            "invalid tasks payload: title must not be empty"
        );

        let err = Error::RecordNotFound("task-1".into());
        assert_eq!(err.to_string(), "record not found: task-1");

        let err = Error::NetworkUnreachable("connection refused".into());
        assert_eq!(err.to_string(), "remote unreachable: connection refused");
    }
}

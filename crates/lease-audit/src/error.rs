//! Error types for the audit trail.

use thiserror::Error;

/// Errors that can occur while handling audit records.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to serialize a record.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

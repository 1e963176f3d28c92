//! Error types for claims-ledger

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Tenant {0} has no country code configured")]
    MissingCountryCode(String),

    #[error("Sequence {0} is outside the claim number range")]
    OutOfRangeSequence(i64),

    #[error("Serialization conflict: {0}")]
    SerializationConflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Returned both for a malformed claim number and for a well-formed one
    /// that matches nothing; the caller must not be able to tell them apart.
    #[error("Claim not found")]
    NotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClaimsError {
    /// Transient errors may be retried by the caller; everything else is
    /// a data or configuration problem and must surface immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClaimsError::SerializationConflict(_))
    }
}

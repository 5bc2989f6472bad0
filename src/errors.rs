//! Leasepool error types.

use thiserror::Error;

/// Errors that can occur while managing license leases.
#[derive(Debug, Error)]
pub enum LeasepoolError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No matching live record exists for the requested key.
    ///
    /// Distinct from a store failure: the store answered, there was just
    /// nothing alive to return.
    #[error("no matching record found")]
    NotFound,

    /// A stored value failed to deserialize, or its expiry timestamp failed
    /// to parse. Always surfaced, never silently treated as expired.
    #[error("Corrupt lease record: {0}")]
    Corrupt(String),

    /// A store read, write, or batch call failed (transport or store-side).
    #[error("Store operation failed: {0}")]
    StoreFailure(String),

    /// A claim request is missing a required field.
    #[error("Invalid lease record: {0}")]
    InvalidRecord(String),
}

//! Error types for CSRF token operations.

use thiserror::Error;

/// Result type for CSRF token operations.
pub type CsrfResult<T> = Result<T, CsrfError>;

/// CSRF-specific errors.
///
/// Token validation failures are not errors: `verify` returns `Ok(false)`
/// for those. Errors represent store unavailability, bad configuration,
/// or malformed data.
#[derive(Debug, Error)]
pub enum CsrfError {
    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Store backend failure
    #[error("Token store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid session ID
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

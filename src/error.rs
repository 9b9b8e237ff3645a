//! Unified error handling for waylog operations.

use thiserror::Error;

/// Unified error type for waylog operations.
///
/// Delivery failures (transport/rejection) are normally reported through
/// [`crate::sync::SendOutcome`] rather than this type; the variants here
/// exist for the transport layer itself and for local faults.
#[derive(Debug, Error)]
pub enum WaylogError {
    /// SQLite/storage error
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network-level delivery failure (unreachable, timeout, malformed response)
    #[error("transport error: {0}")]
    Transport(String),

    /// Server reachable but reported an application-level error
    #[error("server rejected batch: {0}")]
    Rejected(String),
}

/// Result type alias for waylog operations.
pub type Result<T> = std::result::Result<T, WaylogError>;

//! Error types for a3s-ledger

use thiserror::Error;

/// Errors that can occur in the ledger services
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Backend connection failure (Redis, Postgres)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Circuit breaker rejected the call without invoking the operation
    ///
    /// Distinct from a real downstream failure so callers can surface a
    /// 503 instead of retrying.
    #[error("Circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: String },

    /// Operation exceeded its allotted time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Request expired in the admission queue before an execution slot freed up
    #[error("Request timed out after {waited_ms}ms in the admission queue")]
    QueueTimeout { waited_ms: u64 },

    /// Catalog DDL or introspection failure
    #[error("Catalog error during {operation}: {reason}")]
    Catalog { operation: String, reason: String },

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or tampered pagination cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Table or partition not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure in a wrapped downstream operation
    #[error("Downstream error: {0}")]
    Downstream(String),
}

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

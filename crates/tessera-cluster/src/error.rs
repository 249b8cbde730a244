//! Cluster error types

use tessera_core::CoreError;
use thiserror::Error;

/// Failure to bring a local replica up to date with its group leader
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ConsistencyError(pub String);

impl ConsistencyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure of a single call on a single connection.
///
/// Every variant means the connection can no longer be trusted and must be
/// evicted instead of returned to the pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to connect to node {node}: {message}")]
    Connection { node: String, message: String },

    #[error("Protocol error from node {node}: {message}")]
    Protocol { node: String, message: String },

    #[error("Request to node {node} timed out after {timeout_ms} ms")]
    Timeout { node: String, timeout_ms: u64 },
}

/// Result type for transport calls
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Cluster errors
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Check consistency failed: {0}")]
    CheckConsistency(#[from] ConsistencyError),

    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Partition table error: {0}")]
    PartitionTable(String),

    #[error("{method} failed: {message}")]
    Execution { method: String, message: String },

    #[error("Query process error: {0}")]
    QueryProcess(String),

    #[error(transparent)]
    Path(#[from] CoreError),
}

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

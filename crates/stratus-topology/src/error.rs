//! Error types for the Stratus topology directory.

use thiserror::Error;

/// Result type alias for topology directory operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors that can occur during topology directory operations.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("domain {child} references missing parent {parent}")]
    OrphanDomain { child: String, parent: String },
}

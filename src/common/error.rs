//! Error types for ringkv

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // === Wire Errors ===
    #[error("Malformed message: {0}")]
    Malformed(String),

    // === Store Errors ===
    #[error("Key already exists: {0}")]
    DuplicateKey(String),

    #[error("Key not found: {0}")]
    MissingKey(String),

    // === Placement Errors ===
    #[error("Insufficient replicas: need {needed}, have {available}")]
    InsufficientReplicas { needed: usize, available: usize },

    // === Coordination Errors ===
    #[error("Quorum not reached for transaction {0}")]
    QuorumFailed(u64),

    #[error("Transaction {0} timed out")]
    OperationTimeout(u64),

    #[error("Node has not joined the cluster")]
    NotJoined,

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a typed per-operation outcome (reported via reply flags and
    /// log events) rather than a caller bug or internal fault?
    pub fn is_operation_outcome(&self) -> bool {
        matches!(
            self,
            Error::DuplicateKey(_)
                | Error::MissingKey(_)
                | Error::InsufficientReplicas { .. }
                | Error::QuorumFailed(_)
                | Error::OperationTimeout(_)
        )
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

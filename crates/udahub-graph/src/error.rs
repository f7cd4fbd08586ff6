//! Error types for udahub-graph

use thiserror::Error;

use crate::route::NodeId;

/// Result type alias using udahub-graph Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of a storage collaborator
#[derive(Error, Debug)]
pub enum StorageError {
    /// A uniqueness constraint was violated
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }
}

/// Errors that abort a graph invocation.
///
/// Conversation-level failures (unknown account, failed validation, a worker
/// that could not answer) are recorded in the conversation state instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Agent(#[from] udahub_agent::Error),

    /// The execution context is incomplete
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The graph took more node transitions than allowed
    #[error("Graph exceeded {limit} steps without finishing")]
    StepLimitExceeded { limit: usize },

    /// The supervisor ran without leaving a routing decision
    #[error("No route decided after {0:?}")]
    MissingRoute(NodeId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

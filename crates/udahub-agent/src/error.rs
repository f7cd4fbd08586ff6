//! Error types for udahub-agent

use thiserror::Error;

/// Result type alias using udahub-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a sub-agent
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the AI provider layer
    #[error(transparent)]
    Ai(#[from] udahub_ai::Error),

    /// The sub-agent used up its step budget without a final answer
    #[error("Sub-agent exceeded its step limit of {limit}")]
    StepLimitExceeded { limit: usize },

    /// The final answer was not valid JSON
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The final answer did not match the response schema
    #[error("Response does not match schema: {0}")]
    SchemaViolation(String),

    /// The run was cancelled
    #[error("Sub-agent run cancelled")]
    Cancelled,

    /// A generic agent error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error means the step ceiling was hit
    pub fn is_step_limit(&self) -> bool {
        matches!(self, Error::StepLimitExceeded { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidResponse(e.to_string())
    }
}

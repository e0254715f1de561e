//! Error types for the Coderail agent layer
//!
//! The taxonomy keeps governance rejections (carried through from the core)
//! distinct from execution failures: a caller must always be able to tell
//! "the request was rejected by policy" apart from "the system failed to
//! execute a request that was otherwise allowed".

use thiserror::Error;

use coderail_core::CoreError;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for the orchestration layer
#[derive(Error, Debug)]
pub enum AgentError {
    /// Governance layer errors (policy rejection, quota, unknown tenant)
    #[error("Governance error: {0}")]
    Governance(#[from] CoreError),

    /// The inference service failed or timed out; never a partial success
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Embedding call failed
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Vector store call failed
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Git operation failed
    #[error("Git error: {0}")]
    Git(String),

    /// A workflow stage failed; the stage name is part of the contract
    #[error("Workflow failed at {stage}: {message}")]
    WorkflowFailed { stage: String, message: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<git2::Error> for AgentError {
    fn from(e: git2::Error) -> Self {
        AgentError::Git(e.message().to_string())
    }
}

impl AgentError {
    /// Whether this error is a policy/quota rejection rather than an
    /// execution failure
    pub fn is_governance_rejection(&self) -> bool {
        matches!(
            self,
            AgentError::Governance(
                CoreError::PolicyRejected { .. }
                    | CoreError::QuotaExceeded { .. }
                    | CoreError::RateLimitExceeded { .. }
            )
        )
    }
}

//! Error types for Mise

use thiserror::Error;

/// Main error type for Mise operations
///
/// The first four variants are the kinds a conversational turn can fail
/// with; they reach the caller of `Orchestrator::gen_answer` unmodified.
#[derive(Error, Debug)]
pub enum MiseError {
    /// Memory or index storage unreachable, or a storage call timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// No memory document exists for the requested user
    #[error("User not found: {0}")]
    NotFound(String),

    /// The extraction model returned output that is not the expected JSON object
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    /// The generative model call failed or timed out
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MiseError {
    fn from(err: serde_json::Error) -> Self {
        MiseError::Serialization(err.to_string())
    }
}

/// Result type alias for Mise operations
pub type Result<T> = std::result::Result<T, MiseError>;

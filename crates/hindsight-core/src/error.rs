//! Error types for the memory engine.
//!
//! The taxonomy is deliberately small: callers match on the variant to decide
//! between 400-style rejection (`InvalidInput`), 404 (`NotFound`), and retry
//! or abort (`ExternalService`, `Store`). Extraction failures inside a batch
//! are captured per item and never surface as a batch-level error.

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum HindsightError {
    /// Invalid input - bad scope, malformed path, config rule violation.
    /// The message names the offending parameters and values.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Bank, memory, or entity ID unknown
    #[error("Not found: {0}")]
    NotFound(String),

    /// Embed/rerank/LLM endpoint failure (HTTP error or malformed payload)
    #[error("External service failure ({url}, model {model}): {message}")]
    ExternalService {
        /// Endpoint URL
        url: String,
        /// Model name configured for the endpoint
        model: String,
        /// Underlying failure description
        message: String,
    },

    /// Database error
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// LLM fact extraction produced an unusable result
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Operation was cancelled at a suspension point
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, HindsightError>;

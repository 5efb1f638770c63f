//! Typed errors for the extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors that can occur during extraction operations.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Remote AI call failed (network, quota, or model error)
    #[error("upstream AI error: {0}")]
    Upstream(#[from] gemini_client::GeminiError),

    /// AI response was not parseable as the expected schema
    #[error("malformed AI response: {0}")]
    MalformedResponse(String),

    /// A required field was missing on a typed record
    #[error("validation error: missing required field `{field}`")]
    Validation { field: String },

    /// Local file read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of a local file failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV write failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// A spawned worker task panicked or was aborted
    #[error("worker task failed: {0}")]
    Task(String),
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

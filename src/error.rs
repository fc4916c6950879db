//! Error types for the inventory collector.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort an ingestion run.
#[derive(Debug, Error)]
pub enum Error {
    /// A required environment variable is absent.
    #[error("Missing required environment variable: {var}")]
    ConfigMissing { var: String },

    /// An environment variable is present but invalid.
    #[error("Invalid value for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    /// Token acquisition failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-retryable Graph response, or throttling retries exhausted.
    #[error("Graph request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    /// A payload element is missing a required identity field.
    #[error("Malformed entity: {0}")]
    MalformedEntity(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

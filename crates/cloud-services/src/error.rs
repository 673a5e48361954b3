//! Cloud service errors

use thiserror::Error;

/// Errors returned by the subsystem services
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The infrastructure gateway or cloud API rejected the operation
    #[error("cloud API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The cluster spec cannot be turned into a request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for locks, stores and the refresh-ahead cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The lease is held by another owner. Expected under contention.
    #[error("locked")]
    Locked,

    /// Communication with the shared keyed store failed
    #[error("Store error: {0}")]
    Store(String),

    /// A cached record could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// The source of truth failed
    #[error("Source error: {0:#}")]
    Source(anyhow::Error),

    /// Cache options are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// True for the contention signal, which callers treat as "use what you have".
    pub fn is_locked(&self) -> bool {
        matches!(self, CacheError::Locked)
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Locked => StatusCode::CONFLICT,
            CacheError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::Source(_) => StatusCode::BAD_GATEWAY,
            CacheError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

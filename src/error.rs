//! Error type shared by decoding, backend and session code.

use thiserror::Error;

/// Errors surfaced while loading and rendering trajectory data.
///
/// None of these are fatal: callers log them and keep the current map view.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Response body was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON was valid but not a FeatureCollection with a `features` array.
    #[error("invalid feature collection: {0}")]
    InvalidCollection(String),

    /// Transport-level failure talking to the backend.
    #[cfg(feature = "http")]
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("backend returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

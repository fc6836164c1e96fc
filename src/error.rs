// Error types for the uploader library. The binary wraps these in
// `anyhow` for printing; the flows in `ui` match on them to decide which
// guidance to show.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    /// No access token in the config file or the environment.
    #[error("no Strava access token found")]
    MissingToken,

    /// Strava answered 401: the token is expired or lacks `activity:write`.
    #[error("unauthorized (HTTP 401): {0}")]
    Unauthorized(String),

    /// Any other non-success HTTP status.
    #[error("request rejected: {status} - {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Strava accepted the file but failed to turn it into an activity.
    #[error("upload error: {0}")]
    Processing(String),

    #[error("upload {upload_id} still processing after {attempts} checks")]
    Timeout { upload_id: u64, attempts: u32 },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UploadError>;

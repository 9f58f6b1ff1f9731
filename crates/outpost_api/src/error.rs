//! Error types for the API client.

use thiserror::Error;

/// API operation result type.
pub type Result<T> = std::result::Result<T, ApiError>;

/// API client errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure (DNS, connect, timeout, TLS).
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote answered with an unexpected status.
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Local file could not be opened for upload.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

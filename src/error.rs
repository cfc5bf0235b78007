//! Error types for autopress collaborators.
//!
//! Defines the error types raised at the narrow boundaries the pipeline
//! talks through:
//! - Capability handlers (text, research and image backends)
//! - Article hosting (posts, media, authors)
//! - Media fetching (direct and proxied)
//! - The dedup ledger and translation history

use thiserror::Error;

/// Errors returned by a single capability handler.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Missing API key for handler '{0}'")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse handler response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Capability '{0}' is not supported by this handler")]
    Unsupported(String),

    #[error("Handler returned an empty response")]
    EmptyResponse,

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

impl ProviderError {
    /// Whether the failure looks transient (worth trying elsewhere soon).
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RequestFailed(_) | ProviderError::RateLimited(_) => true,
            ProviderError::ApiError { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Errors returned by an article-hosting backend.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Unknown site '{0}'")]
    UnknownSite(String),

    #[error("Post {0} not found")]
    PostNotFound(u64),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Host API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse host response: {0}")]
    ParseError(String),

    #[error("Media upload rejected: {0}")]
    UploadRejected(String),
}

/// Errors raised while fetching media for re-upload.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("Transient fetch failure: {0}")]
    Transient(String),

    #[error("Unexpected status {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("Invalid media URL '{0}'")]
    InvalidUrl(String),

    #[error("Invalid media payload: {0}")]
    InvalidPayload(String),
}

impl FetchError {
    /// Whether the proxy path should retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NotFound(_) | FetchError::Transient(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidUrl(_) | FetchError::InvalidPayload(_) => false,
        }
    }
}

/// Errors raised by ledger storage.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),
}

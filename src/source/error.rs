use thiserror::Error;

/// Typed source errors enabling retry classification.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error {status} for '{path}'")]
    HttpStatus { status: u16, path: String },

    #[error("request for '{path}' failed: {source}")]
    Http {
        path: String,
        source: reqwest::Error,
    },

    /// The service rejected the request with a structured error, e.g. a
    /// `path/not_found` summary. Retrying will not help.
    #[error("API error for '{path}': {summary}")]
    Api { path: String, summary: String },

    #[error("invalid response for '{path}': {reason}")]
    InvalidResponse { path: String, reason: String },
}

impl SourceError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            SourceError::Http { .. } => true,
            SourceError::Api { .. } => false,
            SourceError::InvalidResponse { .. } => false,
        }
    }
}

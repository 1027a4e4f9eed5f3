//! Error types for surplus

use thiserror::Error;

/// Why a banking or LLM call failed, without any payload from the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFailure {
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    Server,
    /// Other 4xx the remote rejected
    Rejected,
    /// Body did not match the expected contract
    MalformedResponse,
}

impl ApiFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFailure::RateLimited => "rate limited",
            ApiFailure::Server => "server error",
            ApiFailure::Rejected => "request rejected",
            ApiFailure::MalformedResponse => "malformed response",
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiFailure::RateLimited | ApiFailure::Server)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Authentication failed")]
    Authentication,

    #[error("API error during {operation}: {}", kind.as_str())]
    Api {
        operation: &'static str,
        kind: ApiFailure,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out during {0}")]
    Timeout(&'static str),

    #[error("Circuit open: {0} skipped after repeated failures")]
    CircuitOpen(&'static str),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a validation failure on a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the retry policy should try the call again
    ///
    /// Authentication is retried because a token refresh on the remote side
    /// can clear it.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Authentication | Error::Timeout(_) | Error::Http(_) => true,
            Error::Api { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

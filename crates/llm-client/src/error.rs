use std::time::Duration;
use thiserror::Error;

/// Failure reported by a completion backend.
///
/// Variants only describe what happened on the wire; deciding whether a
/// failure is a rate limit or worth retrying is left to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Missing credentials or a client that could not be set up
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// HTTP status attached to the failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The request URL is dropped from the message so credentials never end up
/// in logs or results.
impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        let e = e.without_url();
        if e.is_timeout() {
            // reqwest does not expose the configured duration
            return ProviderError::Timeout(Duration::ZERO);
        }
        if let Some(status) = e.status() {
            return ProviderError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            };
        }
        ProviderError::Request(e.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::InvalidResponse(e.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

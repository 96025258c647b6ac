use reqwest::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal failure of a frame stream. Malformed frames never end up here.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("transport error while reading stream: {0}")]
    Transport(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("credential provider failed: {0}")]
    Credentials(String),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ClientError {
    /// Whether a fresh request has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_connect() || e.is_timeout(),
            ClientError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

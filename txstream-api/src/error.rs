use http::StatusCode;
use std::time::Duration;
use thiserror::Error;
use txstream_client::TransportError;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The request completed with a status outside 200-299.
    #[error("upstream responded with {status}: {body}")]
    Protocol { status: StatusCode, body: String },
    #[error("failed to decode response body: {0}")]
    Decode(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("invalid bitfs uri: {0}")]
    InvalidUri(String),
    #[error("stream error: {0}")]
    Stream(String),
}

impl ApiError {
    /// Status code carried by protocol and unary http failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Protocol { status, .. } => Some(*status),
            ApiError::Transport(TransportError::Http { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

use http::HeaderMap;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("http {status}: {body:?}")]
    Http {
        status: StatusCode,
        url: Option<String>,
        headers: Option<HeaderMap>,
        body: Option<String>,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("request build error: {0}")]
    Build(String),
    /// The event stream ended before the transport reported `done` or an error.
    #[error("connection closed before the response completed")]
    Closed,
}

use http::Method;
use http::header::HeaderMap;
use std::time::Duration;
use txstream_client::Request;

pub const BITBUS_TXO_URL: &str = "https://txo.bitbus.network";
pub const BITBUS_BOB_URL: &str = "https://bob.bitbus.network";
pub const BITSOCKET_TXO_URL: &str = "https://txo.bitsocket.network";
pub const BITSOCKET_BOB_URL: &str = "https://bob.bitsocket.network";
pub const BITFS_URL: &str = "https://x.bitfs.network";

const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP endpoint configuration used to talk to one concrete deployment.
///
/// Encapsulates base URL, default headers and the idle timeout applied to
/// long-lived streams, plus helpers for building requests.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub headers: HeaderMap,
    pub stream_idle_timeout: Duration,
}

impl Provider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            headers: HeaderMap::new(),
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
        }
    }

    pub fn bitbus() -> Self {
        Self::new("bitbus", BITBUS_TXO_URL)
    }

    pub fn bitsocket() -> Self {
        Self::new("bitsocket", BITSOCKET_TXO_URL)
    }

    pub fn bitfs() -> Self {
        Self::new("bitfs", BITFS_URL)
    }

    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    pub fn url_for_path(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn build_request(&self, method: Method, path: &str) -> Request {
        let mut req = Request::new(method, self.url_for_path(path));
        req.headers = self.headers.clone();
        req
    }
}

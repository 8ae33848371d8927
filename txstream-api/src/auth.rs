use http::HeaderMap;
use http::HeaderValue;
use txstream_client::Request;

/// Header the Bitbus and Bitsocket APIs read the access token from.
pub const TOKEN_HEADER: &str = "token";

/// Provides the access token sent with API requests.
///
/// Implementations should be cheap and non-blocking; token refresh belongs to
/// higher layers.
pub trait AuthProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, or none for the endpoints that accept anonymous calls.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for StaticToken {
    fn from(token: Option<String>) -> Self {
        Self(token)
    }
}

impl AuthProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

pub(crate) fn add_auth_headers_to_header_map<A: AuthProvider>(auth: &A, headers: &mut HeaderMap) {
    if let Some(token) = auth.token()
        && let Ok(header) = HeaderValue::from_str(&token)
    {
        let _ = headers.insert(TOKEN_HEADER, header);
    }
}

pub(crate) fn add_auth_headers<A: AuthProvider>(auth: &A, mut req: Request) -> Request {
    add_auth_headers_to_header_map(auth, &mut req.headers);
    req
}

use crate::auth::AuthProvider;
use crate::auth::add_auth_headers;
use crate::decode::DecoderKind;
use crate::engine::EngineHandle;
use crate::engine::RequestEngine;
use crate::error::ApiError;
use crate::provider::Provider;
use http::HeaderMap;
use http::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use txstream_client::HttpTransport;
use txstream_client::Request;
use txstream_client::Response;

pub(crate) struct EndpointSession<T: HttpTransport, A: AuthProvider> {
    transport: T,
    provider: Provider,
    auth: A,
}

impl<T: HttpTransport, A: AuthProvider> EndpointSession<T, A> {
    pub(crate) fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            transport,
            provider,
            auth,
        }
    }

    pub(crate) fn provider(&self) -> &Provider {
        &self.provider
    }

    fn make_request(
        &self,
        method: Method,
        path: &str,
        extra_headers: HeaderMap,
        body: Option<Value>,
    ) -> Request {
        let mut req = self.provider.build_request(method, path);
        req.headers.extend(extra_headers);
        req.body = body;
        add_auth_headers(&self.auth, req)
    }

    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        extra_headers: HeaderMap,
        body: Option<Value>,
    ) -> Result<Response, ApiError> {
        let req = self.make_request(method, path, extra_headers, body);
        Ok(self.transport.execute(req).await?)
    }

    /// Unary call whose body is one JSON document.
    pub(crate) async fn execute_json<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<R, ApiError> {
        let resp = self.execute(method, path, HeaderMap::new(), body).await?;
        serde_json::from_slice(&resp.body).map_err(|e| {
            ApiError::Stream(format!(
                "failed to decode {} response: {e}; body: {}",
                self.provider.name,
                String::from_utf8_lossy(&resp.body)
            ))
        })
    }

    pub(crate) async fn open(
        &self,
        method: Method,
        path: &str,
        extra_headers: HeaderMap,
        body: Option<Value>,
        kind: DecoderKind,
    ) -> Result<EngineHandle, ApiError> {
        let req = self.make_request(method, path, extra_headers, body);
        RequestEngine::open(&self.transport, req, kind).await
    }
}

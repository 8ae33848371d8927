use crate::auth::AuthProvider;
use crate::decode::DecoderKind;
use crate::endpoint::session::EndpointSession;
use crate::engine::EngineHandle;
use crate::error::ApiError;
use crate::provider::Provider;
use crate::query;
use crate::record::Record;
use http::HeaderMap;
use http::Method;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use txstream_client::HttpTransport;

/// Chain tip reported by `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub height: u64,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Client for confirmed transactions.
pub struct BitbusClient<T: HttpTransport, A: AuthProvider> {
    session: EndpointSession<T, A>,
}

impl<T: HttpTransport, A: AuthProvider> BitbusClient<T, A> {
    pub fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            session: EndpointSession::new(transport, provider, auth),
        }
    }

    pub fn provider(&self) -> &Provider {
        self.session.provider()
    }

    /// Streams the transactions matching `query` as NDJSON records.
    pub async fn crawl(&self, query: Value) -> Result<EngineHandle, ApiError> {
        let body = query::expand(query)?;
        self.session
            .open(
                Method::POST,
                "block",
                HeaderMap::new(),
                Some(body),
                DecoderKind::Ndjson,
            )
            .await
    }

    /// Buffers the whole crawl.
    pub async fn fetch(&self, query: Value) -> Result<Vec<Value>, ApiError> {
        let records = self.crawl(query).await?.collect().await?;
        Ok(records.into_iter().filter_map(Record::into_json).collect())
    }

    pub async fn status(&self) -> Result<Status, ApiError> {
        self.session
            .execute_json(Method::GET, "status", None)
            .await
    }
}

use crate::auth::AuthProvider;
use crate::decode::DecoderKind;
use crate::endpoint::session::EndpointSession;
use crate::engine::EngineHandle;
use crate::error::ApiError;
use crate::provider::Provider;
use crate::query;
use crate::record::Record;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;
use http::header::ACCEPT;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use txstream_client::HttpTransport;

pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Client for unconfirmed transactions: a bounded crawl of the recent
/// mempool and the live event stream.
pub struct BitsocketClient<T: HttpTransport, A: AuthProvider> {
    session: EndpointSession<T, A>,
}

impl<T: HttpTransport, A: AuthProvider> BitsocketClient<T, A> {
    pub fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            session: EndpointSession::new(transport, provider, auth),
        }
    }

    pub fn provider(&self) -> &Provider {
        self.session.provider()
    }

    pub async fn crawl(&self, query: Value) -> Result<EngineHandle, ApiError> {
        let body = query::expand(query)?;
        self.session
            .open(
                Method::POST,
                "crawl",
                HeaderMap::new(),
                Some(body),
                DecoderKind::Ndjson,
            )
            .await
    }

    pub async fn fetch(&self, query: Value) -> Result<Vec<Value>, ApiError> {
        let records = self.crawl(query).await?.collect().await?;
        Ok(records.into_iter().filter_map(Record::into_json).collect())
    }

    /// Opens the live event stream for `query`, resuming after
    /// `last_event_id` when given. The stream never completes on its own.
    pub async fn listen(
        &self,
        query: Value,
        last_event_id: Option<&str>,
    ) -> Result<EngineHandle, ApiError> {
        let path = format!("s/{}", query::encode_path(query)?);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(id) = last_event_id
            && let Ok(value) = HeaderValue::from_str(id)
        {
            headers.insert(LAST_EVENT_ID_HEADER, value);
        }
        self.session
            .open(Method::GET, &path, headers, None, DecoderKind::EventSource)
            .await
    }
}

/// A live subscription that survives silently stalled connections.
///
/// When no record arrives for the idle timeout the connection is cancelled and
/// reopened from the last event id whose records were all handed out. A
/// message that was in flight at that moment may be delivered twice.
///
/// [`LiveListener::next`] is cancel safe: the idle deadline survives a
/// dropped call.
pub struct LiveListener<T: HttpTransport, A: AuthProvider> {
    client: Arc<BitsocketClient<T, A>>,
    query: Value,
    idle_timeout: Duration,
    handle: Option<EngineHandle>,
    idle_deadline: Instant,
    last_event_id: Option<String>,
    recycles: u64,
}

impl<T: HttpTransport, A: AuthProvider> LiveListener<T, A> {
    /// Uses the provider's stream idle timeout.
    pub fn new(client: Arc<BitsocketClient<T, A>>, query: Value) -> Self {
        let idle_timeout = client.provider().stream_idle_timeout;
        Self {
            client,
            query,
            idle_timeout,
            handle: None,
            idle_deadline: Instant::now() + idle_timeout,
            last_event_id: None,
            recycles: 0,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self.idle_deadline = Instant::now() + idle_timeout;
        self
    }

    /// Starts from a previously observed event id.
    pub fn resume_from(mut self, last_event_id: Option<String>) -> Self {
        self.last_event_id = last_event_id;
        self
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Number of idle recycles so far.
    pub fn recycles(&self) -> u64 {
        self.recycles
    }

    /// Drops the current connection, if any.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.cancel();
        }
    }

    /// Next live record. `None` means the server ended the stream normally;
    /// calling again reconnects.
    pub async fn next(&mut self) -> Option<Result<Value, ApiError>> {
        loop {
            if self.handle.is_none() {
                match self
                    .client
                    .listen(self.query.clone(), self.last_event_id.as_deref())
                    .await
                {
                    Ok(handle) => self.handle = Some(handle),
                    Err(err) => return Some(Err(err)),
                }
                self.idle_deadline = Instant::now() + self.idle_timeout;
            }
            let Some(handle) = self.handle.as_mut() else {
                continue;
            };

            let next = tokio::time::timeout_at(self.idle_deadline, handle.next_record()).await;
            if let Some(id) = handle.last_event_id() {
                self.last_event_id = Some(id);
            }
            match next {
                Ok(Some(Ok(record))) => {
                    self.idle_deadline = Instant::now() + self.idle_timeout;
                    if let Some(value) = record.into_json() {
                        return Some(Ok(value));
                    }
                }
                Ok(Some(Err(err))) => {
                    self.handle = None;
                    return Some(Err(err));
                }
                Ok(None) => {
                    debug!("live stream ended");
                    self.handle = None;
                    return None;
                }
                Err(_) => {
                    self.recycles += 1;
                    info!(
                        idle_timeout = ?self.idle_timeout,
                        last_event_id = ?self.last_event_id,
                        "recycling idle live stream"
                    );
                    self.close();
                }
            }
        }
    }
}

use crate::error::TransportError;
use crate::request::Request;
use crate::request::Response;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use http::HeaderMap;
use http::StatusCode;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing::enabled;
use tracing::trace;

/// Capacity of the channel between the socket pump and the consumer of a
/// connection. A consumer that stops reading stalls the pump, which in turn
/// stops reading from the socket.
const EVENT_CHANNEL_CAPACITY: usize = 64;

const REQUEST_ID_HEADERS: [&str; 3] = ["cf-ray", "x-request-id", "x-amzn-trace-id"];

static NEXT_REQUEST_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies the transport events that belong to one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(u64);

impl RequestToken {
    /// Allocates a process-unique token.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    Status(StatusCode),
    Headers(HeaderMap),
    Data(Bytes),
    Error(TransportError),
    Done,
}

#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub token: RequestToken,
    pub event: TransportEvent,
}

impl TaggedEvent {
    pub fn new(token: RequestToken, event: TransportEvent) -> Self {
        Self { token, event }
    }
}

pub type EventStream = BoxStream<'static, TaggedEvent>;

/// One issued request: its token, the ordered events the transport delivers
/// for it, and the handle used to abort it.
///
/// A multiplexing transport may interleave events of other tokens on the same
/// stream; consumers are expected to filter on [`TransportConnection::token`].
pub struct TransportConnection {
    token: RequestToken,
    events: EventStream,
    cancel: CancellationToken,
}

impl TransportConnection {
    pub fn new(token: RequestToken, events: EventStream, cancel: CancellationToken) -> Self {
        Self {
            token,
            events,
            cancel,
        }
    }

    /// Builds a connection that replays `events` under a freshly allocated
    /// token and then ends.
    pub fn from_events(events: Vec<TransportEvent>) -> Self {
        let token = RequestToken::next();
        let tagged = events
            .into_iter()
            .map(move |event| TaggedEvent::new(token, event))
            .collect::<Vec<_>>();
        Self::new(
            token,
            Box::pin(futures::stream::iter(tagged)),
            CancellationToken::new(),
        )
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    /// Asks the transport to abort the in-flight request. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn into_parts(self) -> (RequestToken, EventStream, CancellationToken) {
        (self.token, self.events, self.cancel)
    }
}

impl fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConnection")
            .field("token", &self.token)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `req` and buffers the whole response body. Non-2xx statuses are
    /// reported as [`TransportError::Http`].
    async fn execute(&self, req: Request) -> Result<Response, TransportError>;

    /// Connects, sends `req` and returns the connection whose event stream
    /// carries status, headers, body chunks and the terminal event. The status
    /// is delivered as an event whatever its value.
    async fn open(&self, req: Request) -> Result<TransportConnection, TransportError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, req: Request) -> reqwest::RequestBuilder {
        let Request {
            method,
            url,
            headers,
            body,
            timeout,
        } = req;

        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        builder
    }

    async fn send(&self, req: Request) -> Result<reqwest::Response, TransportError> {
        if enabled!(Level::TRACE) {
            trace!(
                "{} to {}: {}",
                req.method,
                req.url,
                req.body.as_ref().unwrap_or_default()
            );
        }

        let method = req.method.clone();
        let url = req.url.clone();
        match self.build(req).send().await {
            Ok(response) => {
                tracing::debug!(
                    method = %method,
                    url = %url,
                    status = %response.status(),
                    request_ids = ?extract_request_ids(response.headers()),
                    version = ?response.version(),
                    "Request completed"
                );
                Ok(response)
            }
            Err(error) => {
                tracing::debug!(
                    method = %method,
                    url = %url,
                    status = error.status().map(|s| s.as_u16()),
                    error = %error,
                    "Request failed"
                );
                Err(Self::map_error(error))
            }
        }
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::Build(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

fn extract_request_ids(headers: &HeaderMap) -> Vec<(&'static str, String)> {
    REQUEST_ID_HEADERS
        .iter()
        .filter_map(|&name| {
            let value = headers.get(name)?.to_str().ok()?.to_owned();
            Some((name, value))
        })
        .collect()
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        let url = req.url.clone();
        let resp = self.send(req).await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(Self::map_error)?;
        if !status.is_success() {
            let body = String::from_utf8(bytes.to_vec()).ok();
            return Err(TransportError::Http {
                status,
                url: Some(url),
                headers: Some(headers),
                body,
            });
        }
        Ok(Response {
            status,
            headers,
            body: bytes,
        })
    }

    async fn open(&self, req: Request) -> Result<TransportConnection, TransportError> {
        let resp = self.send(req).await?;
        let token = RequestToken::next();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<TaggedEvent>(EVENT_CHANNEL_CAPACITY);

        let pump_cancel = cancel.clone();
        tokio::spawn(async move {
            pump_response(token, resp, tx, pump_cancel).await;
        });

        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(TransportConnection::new(token, Box::pin(events), cancel))
    }
}

async fn pump_response(
    token: RequestToken,
    resp: reqwest::Response,
    tx: mpsc::Sender<TaggedEvent>,
    cancel: CancellationToken,
) {
    let send = |event| tx.send(TaggedEvent::new(token, event));

    if send(TransportEvent::Status(resp.status())).await.is_err()
        || send(TransportEvent::Headers(resp.headers().clone()))
            .await
            .is_err()
    {
        return;
    }

    let mut body = resp.bytes_stream();
    loop {
        let next = tokio::select! {
            // A cancelled read ends the stream without an error event.
            _ = cancel.cancelled() => {
                trace!(%token, "transport read cancelled");
                return;
            }
            next = body.next() => next,
        };
        let (event, terminal) = match next {
            Some(Ok(chunk)) => (TransportEvent::Data(chunk), false),
            Some(Err(err)) => (
                TransportEvent::Error(ReqwestTransport::map_error(err)),
                true,
            ),
            None => (TransportEvent::Done, true),
        };
        if send(event).await.is_err() || terminal {
            return;
        }
    }
}

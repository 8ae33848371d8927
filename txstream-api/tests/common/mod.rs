#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::HeaderMap;
use http::Method;
use http::StatusCode;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use txstream_api::AuthProvider;
use txstream_api::BitbusClient;
use txstream_api::BitsocketClient;
use txstream_api::Provider;
use txstream_client::HttpTransport;
use txstream_client::Request;
use txstream_client::RequestToken;
use txstream_client::Response;
use txstream_client::TaggedEvent;
use txstream_client::TransportConnection;
use txstream_client::TransportError;
use txstream_client::TransportEvent;

pub const BITBUS_URL: &str = "https://bitbus.test";
pub const BITSOCKET_URL: &str = "https://bitsocket.test";

/// What the fixture answers to one request.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Replays the events, then the stream ends.
    Events(Vec<TransportEvent>),
    /// Replays the events, then stays open until cancelled.
    OpenEnded(Vec<TransportEvent>),
    /// Never produces a single event.
    Stall,
    /// Unary JSON answer.
    Json(Value),
    Fail(TransportError),
}

impl Reply {
    pub fn ndjson(body: &str) -> Self {
        Reply::Events(vec![
            TransportEvent::Status(StatusCode::OK),
            TransportEvent::Data(Bytes::from(body.to_string())),
            TransportEvent::Done,
        ])
    }

    pub fn status(status: StatusCode) -> Self {
        Reply::Events(vec![TransportEvent::Status(status), TransportEvent::Done])
    }

    /// Event stream the server ends after `body`.
    pub fn sse_then_end(body: &str) -> Self {
        Reply::Events(vec![
            TransportEvent::Status(StatusCode::OK),
            TransportEvent::Data(Bytes::from(body.to_string())),
            TransportEvent::Done,
        ])
    }

    pub fn sse(body: &str) -> Self {
        Reply::OpenEnded(vec![
            TransportEvent::Status(StatusCode::OK),
            TransportEvent::Data(Bytes::from(body.to_string())),
        ])
    }
}

struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

/// Ordered log shared by the fixtures of one test.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .clone()
    }
}

/// Answers requests from per-route scripts. The last reply of a route is
/// repeated once the script runs out.
#[derive(Clone)]
pub struct ScriptedTransport {
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<Request>>>,
    journal: Journal,
    cancellations: Arc<Mutex<Vec<CancellationToken>>>,
}

impl ScriptedTransport {
    pub fn new(journal: Journal) -> Self {
        Self {
            routes: Arc::default(),
            requests: Arc::default(),
            journal,
            cancellations: Arc::default(),
        }
    }

    pub fn route(self, method: Method, path: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .push(Route {
                method,
                path: path.to_string(),
                replies: replies.into(),
            });
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|req| url_path(&req.url).starts_with(path))
            .collect()
    }

    /// Whether every opened connection has been cancelled or not.
    pub fn cancelled(&self) -> Vec<bool> {
        self.cancellations
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .iter()
            .map(CancellationToken::is_cancelled)
            .collect()
    }

    fn reply_for(&self, req: &Request) -> Reply {
        let path = url_path(&req.url).to_string();
        self.journal.push(format!("{} {path}", req.method));
        self.requests
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .push(req.clone());

        let mut routes = self
            .routes
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"));
        let Some(route) = routes
            .iter_mut()
            .find(|route| route.method == req.method && path.starts_with(&route.path))
        else {
            return Reply::Events(vec![
                TransportEvent::Status(StatusCode::NOT_FOUND),
                TransportEvent::Done,
            ]);
        };
        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap_or(Reply::Stall)
        } else {
            route.replies.front().cloned().unwrap_or(Reply::Stall)
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        match self.reply_for(&req) {
            Reply::Json(value) => Ok(Response {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from(value.to_string()),
            }),
            Reply::Fail(err) => Err(err),
            other => Err(TransportError::Build(format!(
                "unexpected unary reply {other:?}"
            ))),
        }
    }

    async fn open(&self, req: Request) -> Result<TransportConnection, TransportError> {
        let reply = self.reply_for(&req);
        let token = RequestToken::next();
        let cancel = CancellationToken::new();
        self.cancellations
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .push(cancel.clone());
        let tag = move |events: Vec<TransportEvent>| {
            events
                .into_iter()
                .map(move |event| TaggedEvent::new(token, event))
                .collect::<Vec<_>>()
        };
        let events = match reply {
            Reply::Events(events) => futures::stream::iter(tag(events)).boxed(),
            Reply::OpenEnded(events) => futures::stream::iter(tag(events))
                .chain(futures::stream::pending())
                .boxed(),
            Reply::Stall => futures::stream::pending().boxed(),
            Reply::Fail(err) => return Err(err),
            Reply::Json(value) => futures::stream::iter(tag(vec![
                TransportEvent::Status(StatusCode::OK),
                TransportEvent::Data(Bytes::from(format!("{value}\n"))),
                TransportEvent::Done,
            ]))
            .boxed(),
        };
        Ok(TransportConnection::new(token, events, cancel))
    }
}

pub fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .find('/')
        .map_or("/", |idx| &without_scheme[idx..])
}

#[derive(Clone, Default)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn token(&self) -> Option<String> {
        None
    }
}

pub fn bitbus(transport: ScriptedTransport) -> Arc<BitbusClient<ScriptedTransport, NoAuth>> {
    Arc::new(BitbusClient::new(
        transport,
        Provider::new("bitbus", BITBUS_URL),
        NoAuth,
    ))
}

pub fn bitsocket(
    transport: ScriptedTransport,
    idle_timeout: Duration,
) -> Arc<BitsocketClient<ScriptedTransport, NoAuth>> {
    Arc::new(BitsocketClient::new(
        transport,
        Provider::new("bitsocket", BITSOCKET_URL).with_stream_idle_timeout(idle_timeout),
        NoAuth,
    ))
}

pub fn push_event(id: &str, records: &[Value]) -> String {
    let envelope = serde_json::json!({ "type": "push", "data": records });
    format!("id: {id}\ndata: {envelope}\n\n")
}

pub fn body_of(req: &Request) -> Value {
    req.body.clone().unwrap_or(Value::Null)
}

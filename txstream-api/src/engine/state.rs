use super::demand::DemandQueue;
use crate::decode;
use crate::decode::DecodeBuffer;
use crate::decode::DecoderKind;
use crate::error::ApiError;
use crate::record::Record;
use http::HeaderMap;
use http::StatusCode;
use txstream_client::RequestToken;
use txstream_client::TaggedEvent;
use txstream_client::TransportEvent;

/// Bytes of an error response body kept for the protocol error message.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub enum Phase {
    Connecting,
    Active,
    /// The transport is done; queued records are still handed out on demand.
    Draining,
    Done,
    Failed(ApiError),
}

/// What one processing step produced: records to hand to the consumer and,
/// when the request just ended, its outcome.
#[derive(Debug, Default)]
pub struct Step {
    pub records: Vec<Record>,
    pub outcome: Option<Result<(), ApiError>>,
}

/// State of one request, driven by transport events and consumer demand.
///
/// This type performs no I/O; the engine task feeds it and forwards whatever
/// each [`Step`] releases.
#[derive(Debug)]
pub struct RequestState {
    token: RequestToken,
    kind: DecoderKind,
    buffer: DecodeBuffer,
    queue: DemandQueue,
    status: Option<StatusCode>,
    headers: HeaderMap,
    error_body: Vec<u8>,
    committed_event_id: Option<String>,
    phase: Phase,
}

impl RequestState {
    pub fn new(token: RequestToken, kind: DecoderKind) -> Self {
        Self {
            token,
            kind,
            buffer: DecodeBuffer::new(),
            queue: DemandQueue::new(),
            status: None,
            headers: HeaderMap::new(),
            error_body: Vec::new(),
            committed_event_id: None,
            phase: Phase::Connecting,
        }
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    pub fn kind(&self) -> DecoderKind {
        self.kind
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn outstanding_demand(&self) -> usize {
        self.queue.outstanding()
    }

    pub fn queued(&self) -> usize {
        self.queue.queued()
    }

    /// Id of the last event-stream message whose records have all been
    /// released. Resuming from it never skips a record.
    pub fn last_event_id(&self) -> Option<&str> {
        self.committed_event_id.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Failed(_))
    }

    /// Whether transport events are still being consumed.
    pub fn accepts_events(&self) -> bool {
        matches!(self.phase, Phase::Connecting | Phase::Active)
    }

    pub fn on_transport_event(&mut self, event: &TaggedEvent) -> Step {
        if event.token != self.token || !self.accepts_events() {
            return Step::default();
        }

        match &event.event {
            TransportEvent::Status(status) => {
                self.status = Some(*status);
                self.phase = Phase::Active;
            }
            TransportEvent::Headers(headers) => {
                for (name, value) in headers {
                    self.headers.append(name.clone(), value.clone());
                }
                self.phase = Phase::Active;
            }
            TransportEvent::Data(bytes) => {
                self.phase = Phase::Active;
                if self.status_is_error() {
                    let room = MAX_ERROR_BODY_BYTES.saturating_sub(self.error_body.len());
                    self.error_body
                        .extend_from_slice(&bytes[..bytes.len().min(room)]);
                    return Step::default();
                }
                match decode::decode(self.kind, &mut self.buffer, bytes) {
                    Ok(records) => self.queue.push(records),
                    Err(err) => return self.fail(ApiError::Decode(err.to_string())),
                }
            }
            TransportEvent::Error(err) => return self.fail(ApiError::Transport(err.clone())),
            TransportEvent::Done => {
                if !self.status_is_error() {
                    match decode::finish(self.kind, &mut self.buffer) {
                        Ok(records) => self.queue.push(records),
                        Err(err) => return self.fail(ApiError::Decode(err.to_string())),
                    }
                }
                self.phase = Phase::Draining;
            }
        }
        self.release()
    }

    pub fn request_more(&mut self, n: usize) -> Step {
        if self.is_terminal() {
            return Step::default();
        }
        self.queue.add_demand(n);
        self.release()
    }

    /// Stops the request without delivering anything further. Returns `false`
    /// when the request had already ended.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.queue.discard();
        self.phase = Phase::Done;
        true
    }

    fn status_is_error(&self) -> bool {
        matches!(self.status, Some(status) if !status.is_success() && !status.is_informational())
    }

    fn release(&mut self) -> Step {
        let records = self.queue.deliver();
        if self.queue.is_empty() && self.buffer.last_event_id() != self.last_event_id() {
            self.committed_event_id = self.buffer.last_event_id().map(str::to_string);
        }
        let drained = matches!(self.phase, Phase::Draining)
            && self.queue.is_empty()
            && self.queue.outstanding() > 0;
        let outcome = drained.then(|| self.complete());
        Step { records, outcome }
    }

    fn complete(&mut self) -> Result<(), ApiError> {
        if self.status_is_error()
            && let Some(status) = self.status
        {
            let err = ApiError::Protocol {
                status,
                body: String::from_utf8_lossy(&self.error_body).into_owned(),
            };
            self.phase = Phase::Failed(err.clone());
            return Err(err);
        }
        self.phase = Phase::Done;
        Ok(())
    }

    fn fail(&mut self, err: ApiError) -> Step {
        self.queue.discard();
        self.phase = Phase::Failed(err.clone());
        Step {
            records: Vec::new(),
            outcome: Some(Err(err)),
        }
    }
}

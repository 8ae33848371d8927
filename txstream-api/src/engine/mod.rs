//! Per-request streaming engine.
//!
//! Every opened request runs in its own task. The task consumes the
//! request's transport events in order, decodes the body incrementally and
//! hands records to the [`EngineHandle`] only as fast as the handle asks for
//! them.

mod demand;
mod state;
mod stream;

pub use demand::DemandQueue;
pub use state::Phase;
pub use state::RequestState;
pub use state::Step;
pub use stream::BlockingRecords;
pub use stream::RecordStream;

use crate::decode::DecoderKind;
use crate::error::ApiError;
use crate::record::Record;
use futures::StreamExt;
use std::task::Context;
use std::task::Poll;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use txstream_client::HttpTransport;
use txstream_client::Request;
use txstream_client::RequestToken;
use txstream_client::TaggedEvent;
use txstream_client::TransportConnection;
use txstream_client::TransportError;
use txstream_client::TransportEvent;

/// Decoded records an engine may hold for a consumer that stopped pulling.
/// Past this the engine stops reading the transport until demand returns.
pub const DEFAULT_HIGH_WATER_MARK: usize = 4096;

enum EngineCommand {
    RequestMore(usize),
    Cancel,
}

enum Delivery {
    Record(Record),
    Finished(Result<(), ApiError>),
}

pub struct RequestEngine;

impl RequestEngine {
    /// Issues `request` on `transport` and starts decoding its body as
    /// `kind`. Fails when the transport cannot connect or send; there is no
    /// retry at this layer.
    pub async fn open<T>(
        transport: &T,
        request: Request,
        kind: DecoderKind,
    ) -> Result<EngineHandle, ApiError>
    where
        T: HttpTransport + ?Sized,
    {
        let method = request.method.clone();
        let url = request.url.clone();
        let connection = transport.open(request).await?;
        debug!(token = %connection.token(), %method, %url, ?kind, "opened request");
        Ok(Self::spawn(connection, kind, DEFAULT_HIGH_WATER_MARK))
    }

    /// Starts the engine task for an already opened connection.
    pub fn spawn(
        connection: TransportConnection,
        kind: DecoderKind,
        high_water_mark: usize,
    ) -> EngineHandle {
        let token = connection.token();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (event_id_tx, event_id_rx) = watch::channel(None);

        tokio::spawn(run_engine(
            connection,
            kind,
            high_water_mark.max(1),
            command_rx,
            delivery_tx,
            event_id_tx,
        ));

        EngineHandle {
            token,
            commands: command_tx,
            deliveries: delivery_rx,
            last_event_id: event_id_rx,
            requested: 0,
            stashed: None,
            finished: false,
        }
    }
}

async fn run_engine(
    connection: TransportConnection,
    kind: DecoderKind,
    high_water_mark: usize,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    last_event_id: watch::Sender<Option<String>>,
) {
    let (token, mut events, cancel) = connection.into_parts();
    let mut state = RequestState::new(token, kind);
    let mut delivered = 0usize;

    loop {
        let reading = state.accepts_events() && state.queued() < high_water_mark;
        // Consumer commands go first so that demand and cancellation take
        // effect before further transport events are processed.
        let step = tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(EngineCommand::RequestMore(n)) => state.request_more(n),
                Some(EngineCommand::Cancel) | None => {
                    cancel.cancel();
                    if state.cancel() {
                        debug!(%token, delivered, "request cancelled");
                        let _ = deliveries.send(Delivery::Finished(Ok(())));
                    }
                    return;
                }
            },
            event = events.next(), if reading => {
                let event = event.unwrap_or_else(|| {
                    TaggedEvent::new(token, TransportEvent::Error(TransportError::Closed))
                });
                state.on_transport_event(&event)
            }
        };

        if kind == DecoderKind::EventSource {
            last_event_id.send_if_modified(|current| {
                let latest = state.last_event_id();
                if current.as_deref() == latest {
                    return false;
                }
                *current = latest.map(str::to_string);
                true
            });
        }

        delivered += step.records.len();
        for record in step.records {
            if deliveries.send(Delivery::Record(record)).is_err() {
                cancel.cancel();
                return;
            }
        }

        if let Some(outcome) = step.outcome {
            cancel.cancel();
            match &outcome {
                Ok(()) => debug!(%token, delivered, "request completed"),
                Err(err) => debug!(%token, delivered, "request failed: {err}"),
            }
            let _ = deliveries.send(Delivery::Finished(outcome));
            return;
        }
    }
}

/// Consumer side of a running request.
///
/// Records arrive only after they are requested, either explicitly through
/// [`EngineHandle::request_more`] or implicitly by the pulling helpers.
/// Dropping the handle cancels the request.
pub struct EngineHandle {
    token: RequestToken,
    commands: mpsc::UnboundedSender<EngineCommand>,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    last_event_id: watch::Receiver<Option<String>>,
    requested: usize,
    stashed: Option<Result<(), ApiError>>,
    finished: bool,
}

impl EngineHandle {
    pub fn token(&self) -> RequestToken {
        self.token
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Records requested through this handle and not received yet.
    pub fn outstanding(&self) -> usize {
        self.requested
    }

    /// Id of the last event-stream message the engine dispatched.
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.borrow().clone()
    }

    pub fn request_more(&mut self, n: usize) {
        if n == 0 || self.finished {
            return;
        }
        self.requested = self.requested.saturating_add(n);
        let _ = self.commands.send(EngineCommand::RequestMore(n));
    }

    /// Cancels the in-flight request. Records already received stay valid;
    /// nothing further is delivered. Idempotent.
    pub fn cancel(&mut self) {
        let _ = self.commands.send(EngineCommand::Cancel);
    }

    /// Receives the next record, requesting exactly one when nothing is
    /// outstanding. `None` marks normal termination.
    pub async fn next_record(&mut self) -> Option<Result<Record, ApiError>> {
        std::future::poll_fn(|cx| self.poll_next_record(cx)).await
    }

    /// Receives up to `max` records that are available together, requesting
    /// `max` when nothing is outstanding.
    pub async fn next_batch(&mut self, max: usize) -> Option<Result<Vec<Record>, ApiError>> {
        let max = max.max(1);
        if self.requested == 0 {
            self.request_more(max);
        }
        let first = match std::future::poll_fn(|cx| self.poll_receive(cx)).await? {
            Ok(record) => record,
            Err(err) => return Some(Err(err)),
        };

        let mut batch = vec![first];
        while batch.len() < max && self.stashed.is_none() && !self.finished {
            match self.deliveries.try_recv() {
                Ok(Delivery::Record(record)) => {
                    self.requested = self.requested.saturating_sub(1);
                    batch.push(record);
                }
                Ok(Delivery::Finished(outcome)) => self.stashed = Some(outcome),
                Err(_) => break,
            }
        }
        Some(Ok(batch))
    }

    /// Buffers the whole response.
    pub async fn collect(mut self) -> Result<Vec<Record>, ApiError> {
        self.request_more(usize::MAX);
        let mut records = Vec::new();
        while let Some(record) = std::future::poll_fn(|cx| self.poll_receive(cx)).await {
            records.push(record?);
        }
        Ok(records)
    }

    pub fn into_stream(self) -> RecordStream {
        RecordStream::new(self)
    }

    pub fn into_blocking_iter(self) -> BlockingRecords {
        BlockingRecords::new(self)
    }

    pub(crate) fn poll_next_record(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Record, ApiError>>> {
        if self.requested == 0 {
            self.request_more(1);
        }
        self.poll_receive(cx)
    }

    fn poll_receive(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Record, ApiError>>> {
        if let Some(outcome) = self.stashed.take() {
            return Poll::Ready(self.finish(outcome));
        }
        if self.finished {
            return Poll::Ready(None);
        }
        self.deliveries
            .poll_recv(cx)
            .map(|delivery| self.absorb(delivery))
    }

    pub(crate) fn blocking_next_record(&mut self) -> Option<Result<Record, ApiError>> {
        if let Some(outcome) = self.stashed.take() {
            return self.finish(outcome);
        }
        if self.finished {
            return None;
        }
        if self.requested == 0 {
            self.request_more(1);
        }
        let delivery = self.deliveries.blocking_recv();
        self.absorb(delivery)
    }

    fn absorb(&mut self, delivery: Option<Delivery>) -> Option<Result<Record, ApiError>> {
        match delivery {
            Some(Delivery::Record(record)) => {
                self.requested = self.requested.saturating_sub(1);
                Some(Ok(record))
            }
            Some(Delivery::Finished(outcome)) => self.finish(outcome),
            None => self.finish(Ok(())),
        }
    }

    fn finish(&mut self, outcome: Result<(), ApiError>) -> Option<Result<Record, ApiError>> {
        self.finished = true;
        self.requested = 0;
        outcome.err().map(Err)
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("token", &self.token)
            .field("requested", &self.requested)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

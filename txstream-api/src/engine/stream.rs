use super::EngineHandle;
use crate::error::ApiError;
use crate::record::Record;
use futures::Stream;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

/// Async view of a request: each poll asks for one record when nothing is
/// outstanding, so the stream never runs ahead of its consumer.
#[derive(Debug)]
pub struct RecordStream {
    handle: EngineHandle,
}

impl RecordStream {
    pub(super) fn new(handle: EngineHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    pub fn into_handle(self) -> EngineHandle {
        self.handle
    }
}

impl Stream for RecordStream {
    type Item = Result<Record, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().handle.poll_next_record(cx)
    }
}

/// Blocking view of a request for callers outside the runtime.
///
/// Iterating from inside an async task panics; use [`RecordStream`] there.
#[derive(Debug)]
pub struct BlockingRecords {
    handle: EngineHandle,
}

impl BlockingRecords {
    pub(super) fn new(handle: EngineHandle) -> Self {
        Self { handle }
    }
}

impl Iterator for BlockingRecords {
    type Item = Result<Record, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.handle.blocking_next_record()
    }
}

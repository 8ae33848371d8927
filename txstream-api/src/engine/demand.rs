use crate::record::Record;
use std::collections::VecDeque;

/// Pull-based hand-off between a producer and its consumer.
///
/// Records are released in FIFO order and never beyond what the consumer has
/// asked for; whatever cannot be released yet stays queued.
#[derive(Debug, Default)]
pub struct DemandQueue {
    queued: VecDeque<Record>,
    outstanding: usize,
}

impl DemandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records requested by the consumer and not yet delivered.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn add_demand(&mut self, n: usize) {
        self.outstanding = self.outstanding.saturating_add(n);
    }

    pub fn push(&mut self, records: impl IntoIterator<Item = Record>) {
        self.queued.extend(records);
    }

    /// Releases `min(outstanding, queued)` records.
    pub fn deliver(&mut self) -> Vec<Record> {
        let count = self.outstanding.min(self.queued.len());
        self.outstanding -= count;
        self.queued.drain(..count).collect()
    }

    /// Drops every queued record. Outstanding demand is kept.
    pub fn discard(&mut self) -> usize {
        let dropped = self.queued.len();
        self.queued.clear();
        dropped
    }
}

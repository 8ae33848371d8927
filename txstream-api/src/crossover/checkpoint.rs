use super::tape::Tape;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CheckpointError {
    #[error("checkpoint io failed: {0}")]
    Io(String),
    #[error("checkpoint is corrupt: {0}")]
    Corrupt(String),
}

/// Durable storage for the [`Tape`] of a crossover run.
///
/// Saving the same tape twice must be harmless.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    /// `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<Tape>, CheckpointError>;

    async fn save(&self, tape: &Tape) -> Result<(), CheckpointError>;
}

#[async_trait]
impl<C: Checkpoint + ?Sized> Checkpoint for Arc<C> {
    async fn load(&self) -> Result<Option<Tape>, CheckpointError> {
        (**self).load().await
    }

    async fn save(&self, tape: &Tape) -> Result<(), CheckpointError> {
        (**self).save(tape).await
    }
}

/// Keeps the tape in memory; useful for one-shot runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    tape: Mutex<Option<Tape>>,
}

impl MemoryCheckpoint {
    pub fn new(tape: Option<Tape>) -> Self {
        Self {
            tape: Mutex::new(tape),
        }
    }

    pub fn current(&self) -> Option<Tape> {
        self.tape.lock().ok().and_then(|tape| *tape)
    }
}

#[async_trait]
impl Checkpoint for MemoryCheckpoint {
    async fn load(&self) -> Result<Option<Tape>, CheckpointError> {
        self.tape
            .lock()
            .map(|tape| *tape)
            .map_err(|err| CheckpointError::Io(err.to_string()))
    }

    async fn save(&self, tape: &Tape) -> Result<(), CheckpointError> {
        let mut slot = self
            .tape
            .lock()
            .map_err(|err| CheckpointError::Io(err.to_string()))?;
        *slot = Some(*tape);
        Ok(())
    }
}

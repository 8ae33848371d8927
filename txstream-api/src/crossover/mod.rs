//! Historical crawl followed by live tailing.
//!
//! An [`Orchestrator`] crawls confirmed transactions block range by block
//! range until it reaches the chain tip, then keeps a live subscription to
//! the mempool open. Progress is kept in a [`Tape`] persisted through a
//! [`Checkpoint`].

mod checkpoint;
mod config;
mod orchestrator;
mod tape;

pub use checkpoint::Checkpoint;
pub use checkpoint::CheckpointError;
pub use checkpoint::MemoryCheckpoint;
pub use config::CrossoverConfig;
pub use orchestrator::CrossoverError;
pub use orchestrator::DataHandler;
pub use orchestrator::HandlerError;
pub use orchestrator::Orchestrator;
pub use orchestrator::RecordKind;
pub use tape::Tape;

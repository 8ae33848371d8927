use super::checkpoint::Checkpoint;
use super::checkpoint::CheckpointError;
use super::config::CrossoverConfig;
use super::tape::Tape;
use crate::auth::AuthProvider;
use crate::endpoint::bitbus::BitbusClient;
use crate::endpoint::bitsocket::BitsocketClient;
use crate::endpoint::bitsocket::LiveListener;
use crate::engine::EngineHandle;
use crate::error::ApiError;
use crate::query;
use crate::record::Record;
use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use txstream_client::HttpTransport;

/// Records handed to the [`DataHandler`] per crawl batch at most.
const CRAWL_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Transactions mined at or below the tape's head.
    Confirmed,
    /// Unconfirmed transactions from the live stream.
    Mempool,
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives everything a crossover run ingests, in arrival order.
///
/// Live records may repeat across a reconnect of the live stream. An error
/// halts the run; the tape never moves past a batch that was not accepted.
#[async_trait]
pub trait DataHandler: Send + Sync {
    async fn on_records(&self, kind: RecordKind, records: Vec<Value>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: DataHandler + ?Sized> DataHandler for Arc<H> {
    async fn on_records(&self, kind: RecordKind, records: Vec<Value>) -> Result<(), HandlerError> {
        (**self).on_records(kind, records).await
    }
}

#[derive(Debug, Error)]
pub enum CrossoverError {
    #[error("failed to load checkpoint: {0}")]
    Checkpoint(#[source] CheckpointError),
    #[error("failed to poll chain status: {0}")]
    Status(#[source] ApiError),
    #[error("crawl failed: {0}")]
    Crawl(#[source] ApiError),
    #[error("live stream failed: {0}")]
    Listen(#[source] ApiError),
    #[error("data handler rejected {kind:?} records: {source}")]
    Handler {
        kind: RecordKind,
        #[source]
        source: HandlerError,
    },
}

struct ActiveCrawl {
    handle: EngineHandle,
    target: u64,
}

/// Drives one crossover run: at most one crawl and one live connection at a
/// time, with the tape advanced only after a crawl drains completely.
pub struct Orchestrator<T, A, C, H>
where
    T: HttpTransport,
    A: AuthProvider,
{
    bitbus: Arc<BitbusClient<T, A>>,
    listener: LiveListener<T, A>,
    config: CrossoverConfig,
    checkpoint: C,
    handler: H,
}

impl<T, A, C, H> Orchestrator<T, A, C, H>
where
    T: HttpTransport,
    A: AuthProvider,
    C: Checkpoint,
    H: DataHandler,
{
    pub fn new(
        bitbus: Arc<BitbusClient<T, A>>,
        bitsocket: Arc<BitsocketClient<T, A>>,
        config: CrossoverConfig,
        checkpoint: C,
        handler: H,
    ) -> Self {
        let listener = LiveListener::new(bitsocket, config.query.clone())
            .with_idle_timeout(config.listen_idle_timeout);
        Self {
            bitbus,
            listener,
            config,
            checkpoint,
            handler,
        }
    }

    /// Runs until `shutdown` fires, returning the tape reached, or until a
    /// status poll, a crawl, the live stream or the handler fails. Nothing is
    /// retried here; restarting a failed run is up to the caller.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<Tape, CrossoverError> {
        let mut tape = match self
            .checkpoint
            .load()
            .await
            .map_err(CrossoverError::Checkpoint)?
        {
            Some(tape) => tape,
            None => Tape::starting_at(self.config.from),
        };
        info!(head = tape.head, height = tape.height, "starting crossover");

        let mut ticker = tokio::time::interval(self.config.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut crawl: Option<ActiveCrawl> = None;
        let mut listening = false;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.abandon(&mut crawl);
                    info!(head = tape.head, height = tape.height, "crossover stopped");
                    return Ok(tape);
                }
                _ = ticker.tick() => {
                    let status = self.bitbus.status().await.map_err(CrossoverError::Status)?;
                    tape.observe(status.height);
                    debug!(head = tape.head, height = tape.height, "polled chain status");
                    if crawl.is_none() && !tape.is_caught_up() {
                        crawl = Some(self.start_crawl(&tape).await?);
                    } else if crawl.is_none() && !listening {
                        listening = true;
                    }
                }
                batch = next_crawl_batch(&mut crawl), if crawl.is_some() => match batch {
                    Some(Ok(records)) => {
                        let records = into_values(records);
                        if !records.is_empty()
                            && let Err(source) =
                                self.handler.on_records(RecordKind::Confirmed, records).await
                        {
                            self.abandon(&mut crawl);
                            return Err(CrossoverError::Handler {
                                kind: RecordKind::Confirmed,
                                source,
                            });
                        }
                    }
                    Some(Err(err)) => return Err(CrossoverError::Crawl(err)),
                    None => {
                        if let Some(active) = crawl.take() {
                            self.complete_crawl(&mut tape, active.target).await;
                        }
                        if !listening {
                            info!(head = tape.head, "crossing over to the live stream");
                            listening = true;
                        }
                    }
                },
                record = self.listener.next(), if listening => match record {
                    Some(Ok(value)) => {
                        if let Err(source) =
                            self.handler.on_records(RecordKind::Mempool, vec![value]).await
                        {
                            self.abandon(&mut crawl);
                            return Err(CrossoverError::Handler {
                                kind: RecordKind::Mempool,
                                source,
                            });
                        }
                    }
                    Some(Err(err)) => return Err(CrossoverError::Listen(err)),
                    None => {
                        info!("live stream closed by upstream; reopening on next poll");
                        listening = false;
                    }
                },
            }
        }
    }

    async fn start_crawl(&self, tape: &Tape) -> Result<ActiveCrawl, CrossoverError> {
        let target = tape.height;
        let query = crawl_query(&self.config.query, tape.head, target)
            .map_err(CrossoverError::Crawl)?;
        info!(from = tape.head + 1, to = target, "crawling confirmed range");
        let handle = self
            .bitbus
            .crawl(query)
            .await
            .map_err(CrossoverError::Crawl)?;
        Ok(ActiveCrawl { handle, target })
    }

    fn abandon(&mut self, crawl: &mut Option<ActiveCrawl>) {
        if let Some(mut active) = crawl.take() {
            active.handle.cancel();
        }
        self.listener.close();
    }

    async fn complete_crawl(&self, tape: &mut Tape, target: u64) {
        tape.advance_to(target);
        info!(head = tape.head, "crawl complete");
        // A failed save is retried with the next completed crawl.
        if let Err(err) = self.checkpoint.save(tape).await {
            warn!(head = tape.head, "failed to save checkpoint: {err}");
        }
    }
}

/// Base query restricted to `(head, target]`, oldest block first.
pub(crate) fn crawl_query(base: &Value, head: u64, target: u64) -> Result<Value, ApiError> {
    let mut envelope = query::expand(base.clone())?;
    query::add_filter(
        &mut envelope,
        "blk.i",
        json!({ "$gt": head, "$lte": target }),
    )?;
    query::set_option(&mut envelope, "sort", json!({ "blk.i": 1 }))?;
    Ok(envelope)
}

async fn next_crawl_batch(crawl: &mut Option<ActiveCrawl>) -> Option<Result<Vec<Record>, ApiError>> {
    match crawl {
        Some(active) => active.handle.next_batch(CRAWL_BATCH_SIZE).await,
        None => std::future::pending().await,
    }
}

fn into_values(records: Vec<Record>) -> Vec<Value> {
    records.into_iter().filter_map(Record::into_json).collect()
}

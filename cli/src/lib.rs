//! Command implementations behind the `txstream` binary.

pub mod checkpoint;
pub mod config;
pub mod output;

use anyhow::Context;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use txstream_api::BitbusClient;
use txstream_api::BitfsClient;
use txstream_api::BitfsUri;
use txstream_api::BitsocketClient;
use txstream_api::EngineHandle;
use txstream_api::JoinClient;
use txstream_api::JoinOptions;
use txstream_api::LiveListener;
use txstream_api::Provider;
use txstream_api::Record;
use txstream_api::ReqwestTransport;
use txstream_api::StaticToken;
use txstream_api::crossover::Orchestrator;
use txstream_api::crossover::Tape;

use crate::checkpoint::FileCheckpoint;
use crate::config::ScrapeConfig;
use crate::output::NdjsonWriter;

const CRAWL_PAGE: usize = 500;

type Bitbus = BitbusClient<ReqwestTransport, StaticToken>;
type Bitsocket = BitsocketClient<ReqwestTransport, StaticToken>;

/// Endpoint clients sharing one connection pool and token.
pub struct Clients {
    pub bitbus: Arc<Bitbus>,
    pub bitsocket: Arc<Bitsocket>,
    pub bitfs: BitfsClient<ReqwestTransport, StaticToken>,
}

impl Clients {
    pub fn new(config: &ScrapeConfig) -> Self {
        let transport = ReqwestTransport::new(reqwest::Client::new());
        let auth = StaticToken::from(config.crossover.token.clone());
        let endpoints = &config.endpoints;
        Self {
            bitbus: Arc::new(BitbusClient::new(
                transport.clone(),
                Provider::new("bitbus", endpoints.bitbus.as_str()),
                auth.clone(),
            )),
            bitsocket: Arc::new(BitsocketClient::new(
                transport.clone(),
                Provider::new("bitsocket", endpoints.bitsocket.as_str())
                    .with_stream_idle_timeout(config.crossover.listen_idle_timeout),
                auth.clone(),
            )),
            bitfs: BitfsClient::new(
                transport,
                Provider::new("bitfs", endpoints.bitfs.as_str()),
                auth,
            ),
        }
    }
}

/// Which service a query is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Source {
    /// Confirmed transactions.
    Bitbus,
    /// Unconfirmed transactions.
    Bitsocket,
}

/// Parses a query given on the command line. Anything that is not a JSON
/// object is rejected before a request is made.
pub fn parse_query(raw: &str) -> anyhow::Result<Value> {
    let query: Value = serde_json::from_str(raw).context("query is not valid JSON")?;
    anyhow::ensure!(query.is_object(), "query must be a JSON object");
    Ok(query)
}

/// Crawls into the configured checkpoint and then follows the live stream,
/// writing every record to `out` until `shutdown` fires.
pub async fn run_scrape<W>(
    config: ScrapeConfig,
    out: W,
    shutdown: CancellationToken,
) -> anyhow::Result<Tape>
where
    W: Write + Send + Sync + 'static,
{
    let clients = Clients::new(&config);
    let checkpoint = FileCheckpoint::new(&config.checkpoint);
    info!(checkpoint = %config.checkpoint.display(), "starting scrape");
    let orchestrator = Orchestrator::new(
        clients.bitbus,
        clients.bitsocket,
        config.crossover,
        checkpoint,
        NdjsonWriter::new(out),
    );
    Ok(orchestrator.run(shutdown).await?)
}

/// Streams every record matching `query` from `source` to `out`.
pub async fn run_crawl<W: Write + Send>(
    clients: &Clients,
    source: Source,
    query: Value,
    out: W,
) -> anyhow::Result<usize> {
    let handle = match source {
        Source::Bitbus => clients.bitbus.crawl(query).await?,
        Source::Bitsocket => clients.bitsocket.crawl(query).await?,
    };
    drain(handle, &NdjsonWriter::new(out)).await
}

async fn drain<W: Write + Send>(
    mut handle: EngineHandle,
    writer: &NdjsonWriter<W>,
) -> anyhow::Result<usize> {
    let mut written = 0;
    while let Some(batch) = handle.next_batch(CRAWL_PAGE).await {
        for value in batch?.into_iter().filter_map(Record::into_json) {
            writer.write_value(&value)?;
            written += 1;
        }
    }
    Ok(written)
}

/// Follows the live stream for `query` until `shutdown` fires. After the
/// server ends the stream normally, waits `reconnect_delay` before the next
/// connection.
pub async fn run_listen<W: Write + Send>(
    clients: &Clients,
    query: Value,
    last_event_id: Option<String>,
    reconnect_delay: Duration,
    out: W,
    shutdown: CancellationToken,
) -> anyhow::Result<Option<String>> {
    let writer = NdjsonWriter::new(out);
    let mut listener =
        LiveListener::new(Arc::clone(&clients.bitsocket), query).resume_from(last_event_id);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            record = listener.next() => match record {
                Some(Ok(value)) => writer.write_value(&value)?,
                Some(Err(err)) => return Err(err.into()),
                None => {
                    info!(?reconnect_delay, "live stream ended; reconnecting");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(reconnect_delay) => {}
                    }
                }
            },
        }
    }
    listener.close();
    Ok(listener.last_event_id().map(str::to_string))
}

/// Queries both sources at once and writes the merged result as one JSON
/// document.
pub async fn run_fetch<W: Write>(
    clients: &Clients,
    query: Value,
    options: &JoinOptions,
    mut out: W,
) -> anyhow::Result<()> {
    let join = JoinClient::new(Arc::clone(&clients.bitbus), Arc::clone(&clients.bitsocket));
    let result = join.fetch(query, options).await?;
    serde_json::to_writer_pretty(&mut out, &result)?;
    writeln!(out)?;
    Ok(())
}

/// Looks up one transaction. Returns whether it was found.
pub async fn run_find<W: Write>(
    clients: &Clients,
    txid: &str,
    deadline: Duration,
    mut out: W,
) -> anyhow::Result<bool> {
    let join = JoinClient::new(Arc::clone(&clients.bitbus), Arc::clone(&clients.bitsocket));
    let Some(tx) = join.find(txid, deadline).await? else {
        return Ok(false);
    };
    serde_json::to_writer_pretty(&mut out, &tx)?;
    writeln!(out)?;
    Ok(true)
}

pub async fn run_status<W: Write>(clients: &Clients, mut out: W) -> anyhow::Result<()> {
    let status = clients.bitbus.status().await?;
    serde_json::to_writer(&mut out, &status)?;
    writeln!(out)?;
    Ok(())
}

/// Writes the raw bytes behind a BitFS uri.
pub async fn run_bitfs<W: Write>(clients: &Clients, uri: &str, mut out: W) -> anyhow::Result<()> {
    let uri: BitfsUri = uri.parse()?;
    let bytes = clients.bitfs.fetch(&uri).await?;
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

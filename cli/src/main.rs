use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use txstream_api::JoinOptions;
use txstream_cli::Clients;
use txstream_cli::Source;
use txstream_cli::config::ScrapeConfig;
use txstream_cli::parse_query;

/// Bitcoin transaction streaming over Bitbus, Bitsocket and BitFS.
///
/// Records are written to stdout, one JSON document per line; logs go to
/// stderr and follow `RUST_LOG`.
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "txstream")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Access token; overrides the one in the configuration file.
    #[arg(long, global = true, env = "TXSTREAM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Crawl confirmed blocks up to the chain tip, then follow the mempool.
    Scrape(ScrapeCommand),

    /// Stream every transaction matching a query.
    Crawl(CrawlCommand),

    /// Follow unconfirmed transactions matching a query.
    Listen(ListenCommand),

    /// Fetch confirmed and recent transactions together.
    Fetch(FetchCommand),

    /// Look up one transaction by id.
    Find(FindCommand),

    /// Print the confirmed chain tip.
    Status,

    /// Download the content behind a BitFS uri.
    Bitfs(BitfsCommand),
}

#[derive(Debug, Parser)]
struct ScrapeCommand {
    /// Where the tape is persisted between runs.
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    /// Block to start from when no checkpoint exists yet.
    #[arg(long)]
    from: Option<u64>,

    /// Query to scrape; overrides the configured one.
    #[arg(long, short = 'q')]
    query: Option<String>,
}

#[derive(Debug, Parser)]
struct CrawlCommand {
    /// Query as a JSON object, e.g. '{"find": {"out.s2": "..."}}'.
    query: String,

    #[arg(long, value_enum, default_value_t = Source::Bitbus)]
    source: Source,
}

#[derive(Debug, Parser)]
struct ListenCommand {
    query: String,

    /// Resume after this event id.
    #[arg(long)]
    last_event_id: Option<String>,
}

#[derive(Debug, Parser)]
struct FetchCommand {
    query: String,

    /// Maximum number of transactions per source.
    #[arg(long, default_value_t = 100)]
    limit: usize,

    /// Seconds both sources have to answer.
    #[arg(long, default_value_t = 10)]
    deadline: u64,
}

#[derive(Debug, Parser)]
struct FindCommand {
    txid: String,

    #[arg(long, default_value_t = 10)]
    deadline: u64,
}

#[derive(Debug, Parser)]
struct BitfsCommand {
    /// `bitfs://<txid>.<in|out>.<script>.<chunk>`
    uri: String,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

/// Cancels the returned token on the first ctrl-c.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupted; shutting down"),
            Err(err) => warn!("failed to listen for ctrl-c: {err}"),
        }
        trigger.cancel();
    });
    shutdown
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        config,
        token,
        subcommand,
    } = Cli::parse();
    init_tracing();

    let mut config = ScrapeConfig::load(config.as_deref())?;
    if token.is_some() {
        config.crossover.token = token;
    }

    match subcommand {
        Subcommand::Scrape(cmd) => {
            if let Some(path) = cmd.checkpoint {
                config.checkpoint = path;
            }
            if let Some(from) = cmd.from {
                config.crossover.from = from;
            }
            if let Some(query) = cmd.query {
                config.crossover.query = parse_query(&query)?;
            }
            let tape = txstream_cli::run_scrape(config, std::io::stdout(), shutdown_on_ctrl_c())
                .await?;
            info!(head = tape.head, height = tape.height, "scrape finished");
        }
        Subcommand::Crawl(cmd) => {
            let clients = Clients::new(&config);
            let query = parse_query(&cmd.query)?;
            let count =
                txstream_cli::run_crawl(&clients, cmd.source, query, std::io::stdout()).await?;
            info!(count, "crawl finished");
        }
        Subcommand::Listen(cmd) => {
            let clients = Clients::new(&config);
            let query = parse_query(&cmd.query)?;
            let last_event_id = txstream_cli::run_listen(
                &clients,
                query,
                cmd.last_event_id,
                config.crossover.poll,
                std::io::stdout(),
                shutdown_on_ctrl_c(),
            )
            .await?;
            if let Some(id) = last_event_id {
                info!("resume with --last-event-id {id}");
            }
        }
        Subcommand::Fetch(cmd) => {
            let clients = Clients::new(&config);
            let options = JoinOptions {
                limit: cmd.limit,
                deadline: Duration::from_secs(cmd.deadline),
                ..JoinOptions::default()
            };
            let query = parse_query(&cmd.query)?;
            txstream_cli::run_fetch(&clients, query, &options, std::io::stdout()).await?;
        }
        Subcommand::Find(cmd) => {
            let clients = Clients::new(&config);
            let deadline = Duration::from_secs(cmd.deadline);
            if !txstream_cli::run_find(&clients, &cmd.txid, deadline, std::io::stdout()).await? {
                anyhow::bail!("transaction {} not found", cmd.txid);
            }
        }
        Subcommand::Status => {
            let clients = Clients::new(&config);
            txstream_cli::run_status(&clients, std::io::stdout()).await?;
        }
        Subcommand::Bitfs(cmd) => {
            let clients = Clients::new(&config);
            txstream_cli::run_bitfs(&clients, &cmd.uri, std::io::stdout()).await?;
        }
    }

    Ok(())
}

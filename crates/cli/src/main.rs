//! folio: operator commands for the offline worker.
//!
//! # Commands
//!
//! - `install`: pre-populate partitions and activate
//! - `fetch <url>`: issue a request through the worker
//! - `message <json>`: post a protocol message
//! - `analytics`: print the analytics log
//! - `partitions`: list partitions with entry counts
//! - `sync`: fire a background sync event

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use folio_client::{
    ANALYTICS_SYNC_TAG, FetchClient, FetchConfig, MessageEvent, MessageOutcome, Worker, WorkerRequest,
};
use folio_core::{AppConfig, CacheDb};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing_subscriber::{EnvFilter, fmt};

/// Offline worker for the portfolio site.
#[derive(Parser)]
#[command(name = "folio")]
#[command(version)]
#[command(about = "Operate the portfolio offline worker: partitions, requests and local analytics")]
#[command(propagate_version = true)]
struct Cli {
    /// TOML config file (environment variables still take precedence)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the manifest into the static partition and activate
    Install {
        /// Stop after install; leave stale partitions in place
        #[arg(long)]
        no_activate: bool,
    },
    /// Issue a request through the worker
    Fetch {
        /// URL, or a path on the worker origin
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Print the response body
        #[arg(long)]
        body: bool,
    },
    /// Post a message envelope, e.g. '{"type":"TRACK_VISIT","data":{"page":"/"}}'
    Message {
        json: String,
        /// Sending page origin (default: the worker origin)
        #[arg(long)]
        origin: Option<String>,
    },
    /// Print the analytics log
    Analytics,
    /// List partitions with their entry counts
    Partitions,
    /// Fire a background sync event
    Sync {
        #[arg(long, default_value = ANALYTICS_SYNC_TAG)]
        tag: String,
    },
}

#[derive(Serialize)]
struct FetchSummary {
    url: String,
    status: u16,
    source: folio_client::ResponseSource,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

async fn open_worker(config: &AppConfig) -> Result<Worker> {
    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(config))?);
    Ok(Worker::new(config, db, network)?)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;
    let worker = open_worker(&config).await?;
    let origin = worker.origin().origin().ascii_serialization();

    match cli.command {
        Commands::Install { no_activate } => {
            let install = worker.install().await?;
            print_json(&install)?;
            if !no_activate {
                print_json(&worker.activate().await?)?;
            }
        }
        Commands::Fetch { url, method, body } => {
            if !worker.resume().await? && !worker.serve_previous().await? {
                tracing::warn!("worker was never activated; the request passes straight to the network");
            }
            let url = if url.starts_with('/') { worker.origin().join(&url)?.to_string() } else { url };
            let request = WorkerRequest::with_method_name(&method, &url)?;
            let response = worker.fetch(&request).await;
            worker.settle().await;
            print_json(&FetchSummary {
                url: request.url.to_string(),
                status: response.status.as_u16(),
                source: response.source,
                bytes: response.body.len(),
                body: body.then(|| response.text()),
            })?;
        }
        Commands::Message { json, origin: from } => {
            let data: serde_json::Value = serde_json::from_str(&json).context("message is not valid JSON")?;
            let (tx, rx) = oneshot::channel();
            let event = MessageEvent::new(from.unwrap_or(origin), data).with_reply(tx);
            match worker.handle_message(event).await {
                MessageOutcome::Replied => print_json(&rx.await?)?,
                outcome => print_json(&outcome)?,
            }
        }
        Commands::Analytics => {
            let (tx, rx) = oneshot::channel();
            let event = MessageEvent::new(origin, serde_json::json!({"type": "GET_ANALYTICS"})).with_reply(tx);
            if worker.handle_message(event).await != MessageOutcome::Replied {
                bail!("worker did not answer GET_ANALYTICS");
            }
            print_json(&rx.await?)?;
        }
        Commands::Partitions => {
            for partition in worker.db().partition_stats().await? {
                let current = if config.partitions.contains(&partition.name) { "" } else { " (stale)" };
                println!("{:<32} {:>6} entries  created {}{}", partition.name, partition.entries, partition.created_at, current);
            }
        }
        Commands::Sync { tag } => {
            if !worker.sync(&tag).await? {
                bail!("no handler for sync tag {tag:?}");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    run(cli).await
}

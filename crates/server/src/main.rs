//! folio-worker server entry point.
//!
//! Boots the offline worker and serves it as an MCP server on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use folio_client::{FetchClient, FetchConfig, Worker};
use folio_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, db = %config.db_path.display(), "Starting folio-worker on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = Arc::new(Worker::new(&config, db.clone(), network)?);

    // A failed install leaves the worker redundant; worker_install retries it.
    // Until then the last activated partitions keep answering requests.
    match worker.resume().await {
        Ok(true) => {}
        Ok(false) => {
            if let Err(e) = worker.start().await {
                tracing::error!(error = %e, "worker did not activate");
                match worker.serve_previous().await {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!("no activated partitions to fall back on"),
                    Err(e) => tracing::error!(error = %e, "could not read worker state"),
                }
            }
        }
        Err(e) => tracing::error!(error = %e, "could not read worker state"),
    }

    let handler = handler::FolioWorkerServer::new(worker);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    if let Err(e) = db.close().await {
        tracing::warn!(error = %e, "database did not close cleanly");
    }

    Ok(())
}

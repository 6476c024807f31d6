//! HTTP API binary entry point.
//!
//! This binary starts the paper search API. It reads settings from the
//! environment, connects the semantic index and the local store, and serves
//! until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use paper_cascade::{
    config::Settings, query::QueryResolver, semantic::mindsdb::MindsDbClient, server,
    storage::sqlite::SqliteStore, PaperStore,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Academic paper search API
#[derive(Parser, Debug)]
#[command(name = "paper-api", version, about = "Serve the academic paper search API over HTTP")]
struct Args {
    /// Listen address
    #[arg(long, env = "API_HOST")]
    host: Option<String>,

    /// Listen port
    #[arg(long, env = "API_PORT")]
    port: Option<u16>,

    /// Local SQLite store path
    #[arg(long, env = "PAPER_DB_PATH", value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    setup_logging(&args.log_level);

    let mut settings = Settings::from_env().context("Failed to load settings from environment")?;
    if let Some(host) = args.host {
        settings.api.host = host;
    }
    if let Some(port) = args.port {
        settings.api.port = port;
    }
    if let Some(path) = args.db_path {
        settings.store_path = path;
    }

    info!("Starting paper search API v{}", paper_cascade::VERSION);

    let index = MindsDbClient::new(&settings.semantic)
        .context("Failed to configure the MindsDB client")?;
    info!(
        "Semantic index: {} (knowledge base '{}')",
        settings.semantic.base_url(),
        settings.semantic.kb_name
    );

    // A missing store only disables the text search tier
    let store = SqliteStore::open(&settings.store_path);
    match store.count_papers().await {
        Ok(count) => info!(
            "Paper store {} contains {} papers",
            settings.store_path.display(),
            count
        ),
        Err(e) => warn!(
            "Paper store {} unavailable: {}",
            settings.store_path.display(),
            e
        ),
    }

    if settings.synthetic_fallback {
        warn!("Synthetic fallback enabled; searches return placeholders when all backends are down");
    }

    let resolver = Arc::new(QueryResolver::from_settings(
        &settings,
        Arc::new(index),
        Arc::new(store),
    ));

    server::serve(&settings.api, resolver)
        .await
        .context("HTTP server failed")?;

    Ok(())
}

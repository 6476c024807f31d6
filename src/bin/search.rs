//! Search binary entry point.
//!
//! This binary runs a single query through the same tier cascade as the HTTP
//! API and prints the results as a table or JSON. Connection settings come
//! from the environment (and an optional `.env` file), with flags for the
//! common overrides.
//!
//! # Examples
//!
//! Plain search:
//! ```bash
//! paper-search search "neural networks" --limit 5
//! ```
//!
//! Threshold search with JSON output:
//! ```bash
//! paper-search --format json semantic "graph transformers" --threshold 0.6
//! ```
//!
//! Filtered search against a specific store:
//! ```bash
//! paper-search --db-path papers.db hybrid "reinforcement learning" --authors smith --year 2020
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_cascade::{
    config::Settings,
    models::{MetadataFilterSet, Paper},
    query::{QueryResolver, Resolution},
    semantic::mindsdb::MindsDbClient,
    storage::sqlite::SqliteStore,
    tier::{synthetic::is_synthetic_id, TierKind},
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table
    Table,
    /// Machine-readable JSON format
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plain search, truncated to --limit
    Search {
        query: String,

        #[arg(long, short = 'n', default_value = "10")]
        limit: usize,
    },

    /// Search keeping only results at or above --threshold
    Semantic {
        query: String,

        #[arg(long, short = 't', default_value = "0.7")]
        threshold: f32,
    },

    /// Search filtered by author, year and category
    Hybrid {
        query: String,

        #[arg(long, short = 'n', default_value = "10")]
        limit: usize,

        /// Case-insensitive author substring
        #[arg(long)]
        authors: Option<String>,

        /// Minimum publication year (inclusive)
        #[arg(long, value_name = "YEAR")]
        year: Option<i32>,

        /// Case-insensitive category substring (e.g. cs.LG)
        #[arg(long)]
        categories: Option<String>,
    },

    /// Look up a single paper by entry id
    Get { entry_id: String },
}

/// Search academic papers with fallback across backends
#[derive(Parser, Debug)]
#[command(
    name = "paper-search",
    version,
    about = "Search academic papers through the semantic index, falling back to the local store",
    long_about = "Runs one query through the search cascade: the MindsDB knowledge base first, \
                  then a substring search over the local SQLite store, then synthetic placeholders \
                  when both are unavailable. Synthetic rows are marked in the output."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Local SQLite store path
    #[arg(long, env = "PAPER_DB_PATH", value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,

    /// MindsDB host
    #[arg(long, env = "MINDSDB_HOST", global = true)]
    mindsdb_host: Option<String>,

    /// MindsDB HTTP port
    #[arg(long, env = "MINDSDB_PORT", global = true)]
    mindsdb_port: Option<u16>,

    /// Fail instead of printing synthetic placeholders
    #[arg(long, global = true)]
    no_synthetic: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL", global = true)]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::from_env().context("Failed to load settings from environment")?;
    if let Some(path) = &args.db_path {
        settings.store_path = path.clone();
    }
    if let Some(host) = &args.mindsdb_host {
        settings.semantic.host = host.clone();
    }
    if let Some(port) = args.mindsdb_port {
        settings.semantic.port = port;
    }
    if args.no_synthetic {
        settings.synthetic_fallback = false;
    }
    Ok(settings)
}

fn build_resolver(settings: &Settings) -> Result<QueryResolver> {
    let index = MindsDbClient::new(&settings.semantic)
        .context("Failed to configure the MindsDB client")?;
    info!("Semantic index at {}", settings.semantic.base_url());

    if !settings.store_path.exists() {
        warn!(
            "Paper store not found at {}; text search fallback will be unavailable",
            settings.store_path.display()
        );
    }
    let store = SqliteStore::open(&settings.store_path);

    Ok(QueryResolver::from_settings(settings, Arc::new(index), Arc::new(store)))
}

/// Truncate to `max` characters, appending "..." when shortened.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn year_cell(paper: &Paper) -> Cell {
    match paper.publication_year() {
        Some(year) => Cell::new(year),
        None => Cell::new("-"),
    }
}

/// Format results as a pretty table
fn format_results_table(resolution: &Resolution) -> String {
    if resolution.records.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Entry ID").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, record) in resolution.records.iter().enumerate() {
        let paper = &record.paper;
        let id_cell = if is_synthetic_id(&paper.entry_id) {
            Cell::new(format!("{} (synthetic)", paper.entry_id)).fg(Color::Yellow)
        } else {
            Cell::new(&paper.entry_id)
        };

        // Lexical hits share one score, so color only semantic scores
        let score_cell = Cell::new(format!("{:.4}", record.relevance_score));
        let score_cell = match resolution.tier {
            TierKind::Semantic if record.relevance_score >= 0.8 => score_cell.fg(Color::Green),
            TierKind::Semantic if record.relevance_score >= 0.6 => score_cell.fg(Color::Cyan),
            _ => score_cell,
        };

        table.add_row(vec![
            Cell::new(idx + 1),
            id_cell,
            Cell::new(truncate(&paper.title, 60)),
            Cell::new(truncate(&paper.authors, 40)),
            year_cell(paper),
            score_cell,
        ]);
    }

    table.to_string()
}

fn print_resolution(resolution: &Resolution, format: &OutputFormat, elapsed_secs: f64) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(resolution));
            println!(
                "\nFound {} results in {:.2}s ({} tier)",
                resolution.count(),
                elapsed_secs,
                resolution.tier
            );
            if resolution.is_synthetic() {
                println!("WARNING: no search backend was available; these results are placeholders.");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "source_tier": resolution.tier,
                "degraded": resolution.is_synthetic(),
                "total_results": resolution.count(),
                "results": resolution.records,
            });
            let json = serde_json::to_string_pretty(&json)
                .with_context(|| "Failed to serialize results to JSON")?;
            println!("{}", json);
        }
    }
    Ok(())
}

/// Display detailed view of a single paper
fn print_paper(paper: &Paper, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", "═".repeat(80));
            println!("Entry ID: {}", paper.entry_id);
            if is_synthetic_id(&paper.entry_id) {
                println!("(synthetic placeholder, not a real paper)");
            }
            println!("Title: {}", paper.title);
            println!("Authors: {}", paper.authors);
            match paper.published_date {
                Some(date) => println!("Published: {}", date),
                None => println!("Published: unknown"),
            }
            println!("Categories: {}", paper.categories);
            if let Some(url) = &paper.pdf_url {
                println!("PDF: {}", url);
            }
            println!("\nAbstract:\n{}", paper.summary);
            println!("{}", "═".repeat(80));
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(paper)
                .with_context(|| "Failed to serialize paper to JSON")?;
            println!("{}", json);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Optional .env, ignored when absent
    dotenvy::dotenv().ok();

    let args = Args::parse();
    setup_logging(&args.log_level);

    let settings = load_settings(&args)?;
    let resolver = build_resolver(&settings)?;

    let start = Instant::now();
    let resolution = match args.command {
        Command::Get { entry_id } => {
            debug!("Looking up paper {}", entry_id);
            let paper = resolver
                .get_by_identifier(&entry_id)
                .await
                .with_context(|| format!("Failed to retrieve paper '{}'", entry_id))?;
            return print_paper(&paper, &args.format);
        }
        Command::Search { query, limit } => resolver
            .search(&query, limit)
            .await
            .with_context(|| format!("Failed to execute search for query: '{}'", query))?,
        Command::Semantic { query, threshold } => resolver
            .semantic_search(&query, threshold)
            .await
            .with_context(|| format!("Failed to execute semantic search for query: '{}'", query))?,
        Command::Hybrid {
            query,
            limit,
            authors,
            year,
            categories,
        } => {
            let filters = MetadataFilterSet {
                authors,
                min_year: year,
                categories,
            };
            resolver
                .hybrid_search(&query, Some(filters), limit)
                .await
                .with_context(|| format!("Failed to execute hybrid search for query: '{}'", query))?
        }
    };

    print_resolution(&resolution, &args.format, start.elapsed().as_secs_f64())
}

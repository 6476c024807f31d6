//! Paper Cascade - resilient search over academic paper records.
//!
//! This library answers free-text and metadata-filtered paper queries while
//! tolerating the loss of its primary search backend.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Paper, PaperRecord, MetadataFilterSet)
//! - **relevance**: Maps each backend's native signal to a score in `[0, 1]`
//! - **filter**: Metadata filter evaluation over candidate papers
//! - **semantic**: The primary backend (MindsDB knowledge base over HTTP)
//! - **storage**: The secondary backend (local SQLite paper store)
//! - **tier**: One search strategy per backend, plus synthetic placeholders
//! - **query**: The resolver that cascades through the tiers
//! - **config**: Settings loaded once from the environment
//! - **server**: HTTP API implementation
//!
//! # Workflow
//!
//! 1. Validate the query text, limit and threshold
//! 2. Try the semantic index; distances become relevance scores
//! 3. If it is unavailable, run a substring search against the SQLite store
//! 4. If that is unavailable too, return synthetic placeholders
//! 5. Apply the operation's threshold, filters and limit to the winning tier
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paper_cascade::{
//!     config::Settings,
//!     query::QueryResolver,
//!     semantic::mindsdb::MindsDbClient,
//!     storage::sqlite::SqliteStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let index = Arc::new(MindsDbClient::new(&settings.semantic)?);
//!     let store = Arc::new(SqliteStore::open(&settings.store_path));
//!     let resolver = QueryResolver::from_settings(&settings, index, store);
//!
//!     let resolution = resolver.search("deep learning", 10).await?;
//!     println!("answered by the {} tier", resolution.tier);
//!     for record in resolution.records {
//!         println!("{}: {}", record.paper.title, record.relevance_score);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod config;
pub mod filter;
pub mod models;
pub mod query;
pub mod relevance;
pub mod semantic;
pub mod server;
pub mod storage;
pub mod tier;

// Re-export commonly used types at the crate root
pub use config::Settings;
pub use models::{MetadataFilterSet, Paper, PaperRecord};
pub use query::{QueryError, QueryResolver, Resolution, SearchQuery};
pub use semantic::SemanticIndex;
pub use storage::PaperStore;
pub use tier::{TierKind, TierStrategy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

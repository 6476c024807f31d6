//! Local structured paper store.
//!
//! This module defines the interface to the secondary search backend: a local
//! store of bibliographic rows that supports substring and comparison
//! predicates. It backs the lexical search tier and the point lookup. The
//! store is owned and populated by ingestion; this crate only reads it (the
//! insert path exists for seeding).

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MetadataFilterSet, Paper};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database could not be opened
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Schema creation error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Same entry id already stored
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Other unexpected errors
    #[error("Unexpected storage error: {0}")]
    Other(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::QueryError(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the local paper store.
///
/// Implementations must bind every user-supplied value as a query parameter;
/// no query text is ever built by interpolating user input.
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Case-insensitive substring search of `text` against title, summary and
    /// categories.
    ///
    /// Every present predicate in `filters` is pushed down as a native query
    /// constraint. Results come back in insertion order, at most `limit` rows.
    ///
    /// # Errors
    /// Returns `StorageError` if the store cannot be opened or the query fails
    async fn search_text(
        &self,
        text: &str,
        filters: Option<&MetadataFilterSet>,
        limit: usize,
    ) -> StorageResult<Vec<Paper>>;

    /// Exact lookup by entry id.
    ///
    /// # Returns
    /// `None` when no paper has this id
    async fn get_paper(&self, entry_id: &str) -> StorageResult<Option<Paper>>;

    /// Total number of stored papers.
    async fn count_papers(&self) -> StorageResult<usize>;
}

/// Escape `%`, `_` and `\` so user text matches literally inside a
/// `LIKE ... ESCAPE '\'` pattern, and wrap it for substring matching.
///
/// The pattern is lowercased with `str::to_lowercase` to pair with the
/// store's Unicode-aware lowercase function on the SQL side.
pub fn like_substring_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for ch in text.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

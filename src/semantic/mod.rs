//! Semantic index abstraction.
//!
//! This module defines the interface to the primary search backend: a
//! network service that ranks papers by embedding distance to a text anchor.
//! The abstraction lets the semantic tier run against the real service or a
//! test double without changing the cascade.

pub mod mindsdb;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

/// Errors that can occur when querying the semantic index.
#[derive(Debug, Error)]
pub enum SemanticIndexError {
    /// Service could not be reached (DNS, refused connection, timeout)
    #[error("Semantic index unreachable: {0}")]
    Connection(String),

    /// Credentials rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The service accepted the request but the query failed
    #[error("Query execution failed: {0}")]
    Execution(String),

    /// The response did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Input that cannot be expressed safely in a query
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Client misconfiguration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for semantic index operations.
pub type SemanticResult<T> = Result<T, SemanticIndexError>;

/// A paper returned by the semantic index with its raw distance.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPaper {
    pub paper: Paper,

    /// Backend-native dissimilarity, lower is more similar
    pub distance: f64,
}

/// Trait for semantic similarity backends.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Find up to `limit` papers most similar to `anchor`.
    ///
    /// # Returns
    /// Papers in ascending distance order
    ///
    /// # Errors
    /// Returns `SemanticIndexError` on connectivity, authentication or
    /// execution failure. Implementations do not retry.
    async fn similarity_search(&self, anchor: &str, limit: usize) -> SemanticResult<Vec<ScoredPaper>>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

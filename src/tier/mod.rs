//! Search tiers.
//!
//! A tier is one independently-failing search strategy. The resolver tries
//! them in order and stops at the first one that answers; see
//! [`crate::query::QueryResolver`].
//!
//! Every backend-specific error is converted to [`TierUnavailable`] at the
//! tier boundary. Nothing about the underlying failure other than a log
//! message reaches the resolver.

pub mod lexical;
pub mod semantic;
pub mod synthetic;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PaperRecord;
use crate::query::SearchQuery;

pub use lexical::LexicalTier;
pub use semantic::SemanticTier;
pub use synthetic::SyntheticTier;

/// Which strategy produced a set of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Embedding similarity against the semantic index
    Semantic,
    /// Substring match against the local paper store
    Lexical,
    /// Placeholder records, no real bibliographic meaning
    Synthetic,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Semantic => "semantic",
            TierKind::Lexical => "lexical",
            TierKind::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tier's backend could not be reached or its query failed.
#[derive(Debug, Error)]
#[error("{tier} tier unavailable: {reason}")]
pub struct TierUnavailable {
    pub tier: TierKind,
    /// Human-readable cause, for logs only
    pub reason: String,
}

impl TierUnavailable {
    pub fn new(tier: TierKind, reason: impl fmt::Display) -> Self {
        Self {
            tier,
            reason: reason.to_string(),
        }
    }
}

/// Result type for a single tier attempt.
pub type TierResult = Result<Vec<PaperRecord>, TierUnavailable>;

/// Trait for one step of the search cascade.
///
/// Implementations return records in their native order with relevance
/// already normalized, and never retry internally.
#[async_trait]
pub trait TierStrategy: Send + Sync {
    /// The kind of this tier, reported alongside its results.
    fn kind(&self) -> TierKind;

    /// Run the tier for `query`, producing at most `query.limit` records.
    ///
    /// An empty list is a successful answer, not a failure.
    async fn attempt(&self, query: &SearchQuery) -> TierResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_kind_display_and_serde() {
        assert_eq!(TierKind::Lexical.to_string(), "lexical");
        assert_eq!(serde_json::to_string(&TierKind::Synthetic).unwrap(), "\"synthetic\"");
    }

    #[test]
    fn test_tier_unavailable_message() {
        let err = TierUnavailable::new(TierKind::Semantic, "connection refused");
        assert_eq!(err.to_string(), "semantic tier unavailable: connection refused");
    }
}

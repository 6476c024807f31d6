//! Query resolution.
//!
//! This module drives the search cascade. Each public operation validates its
//! input, builds a [`SearchQuery`], and hands it to the tiers in order:
//! semantic, then lexical, then synthetic. The first tier that answers wins,
//! including with an empty list; a tier that is unavailable passes the query
//! on to the next one. Tiers are never raced and their results never merged.
//!
//! After the cascade the operation applies its own post-processing (relevance
//! floor, metadata filters, truncation) to the winning tier's records, keeping
//! that tier's native order.
//!
//! # Availability tradeoff
//!
//! With the synthetic tier enabled (the default), the three search operations
//! always return something, possibly placeholders. [`Resolution::tier`] tells
//! callers which tier answered so that degraded results can be recognized.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use paper_cascade::config::Settings;
//! use paper_cascade::query::QueryResolver;
//! use paper_cascade::semantic::mindsdb::MindsDbClient;
//! use paper_cascade::storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_env()?;
//! let index = Arc::new(MindsDbClient::new(&settings.semantic)?);
//! let store = Arc::new(SqliteStore::open(&settings.store_path));
//! let resolver = QueryResolver::from_settings(&settings, index, store);
//!
//! let resolution = resolver.search("graph neural networks", 10).await?;
//! for record in &resolution.records {
//!     println!("{} - {:.3}", record.paper.title, record.relevance_score);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{SearchLimits, Settings};
use crate::filter;
use crate::models::{MetadataFilterSet, Paper, PaperRecord};
use crate::semantic::SemanticIndex;
use crate::storage::PaperStore;
use crate::tier::synthetic::synthetic_paper_for_id;
use crate::tier::{LexicalTier, SemanticTier, SyntheticTier, TierKind, TierStrategy};

/// Errors surfaced by the resolver.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Empty query, or a limit/threshold out of range. No tier was tried.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Point lookup found nothing
    #[error("Paper with ID '{0}' not found")]
    NotFound(String),

    /// No tier could answer. Only reachable from the point lookup, or from
    /// searches when the synthetic tier is disabled.
    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// A query as handed to the tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// The search text, used as the similarity anchor or substring
    pub text: String,

    /// Maximum number of candidates a tier should return
    pub limit: usize,

    /// Relevance floor, only used by threshold-filtered search
    pub threshold: f32,

    /// Optional metadata constraints
    pub filters: Option<MetadataFilterSet>,
}

impl SearchQuery {
    /// Create a new query.
    ///
    /// # Arguments
    /// * `text` - The search text
    /// * `limit` - Maximum number of results (default: 10)
    pub fn new(text: impl Into<String>, limit: Option<usize>) -> Self {
        Self {
            text: text.into(),
            limit: limit.unwrap_or(crate::config::DEFAULT_SEARCH_LIMIT),
            threshold: 0.0,
            filters: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Attach filters. A set with no fields present is dropped.
    pub fn with_filters(mut self, filters: Option<MetadataFilterSet>) -> Self {
        self.filters = filters.filter(|f| !f.is_empty());
        self
    }

    /// Check text, limit and threshold against `limits`.
    ///
    /// The HTTP layer validates too, but the resolver does not rely on it.
    pub fn validate(&self, limits: &SearchLimits) -> QueryResult<()> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            return Err(QueryError::InvalidQuery("Query cannot be empty".to_string()));
        }
        if trimmed.chars().count() > limits.max_query_length {
            return Err(QueryError::InvalidQuery(format!(
                "Query cannot exceed {} characters",
                limits.max_query_length
            )));
        }
        if self.limit < limits.min_limit || self.limit > limits.max_limit {
            return Err(QueryError::InvalidQuery(format!(
                "Limit must be between {} and {}",
                limits.min_limit, limits.max_limit
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(QueryError::InvalidQuery(
                "Threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// The winning tier's records for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Tier that answered
    pub tier: TierKind,

    /// Records in that tier's native order
    pub records: Vec<PaperRecord>,
}

impl Resolution {
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// True when the records are placeholders rather than real papers.
    pub fn is_synthetic(&self) -> bool {
        self.tier == TierKind::Synthetic
    }
}

/// Drives the tier cascade for every search operation.
pub struct QueryResolver {
    tiers: Vec<Arc<dyn TierStrategy>>,
    store: Arc<dyn PaperStore>,
    limits: SearchLimits,
    synthetic_fallback: bool,
}

impl QueryResolver {
    /// Standard cascade: semantic index, then the local store, then (when
    /// enabled) synthetic placeholders.
    pub fn from_settings(
        settings: &Settings,
        index: Arc<dyn SemanticIndex>,
        store: Arc<dyn PaperStore>,
    ) -> Self {
        let mut tiers: Vec<Arc<dyn TierStrategy>> = vec![
            Arc::new(SemanticTier::new(index)),
            Arc::new(LexicalTier::new(Arc::clone(&store))),
        ];
        if settings.synthetic_fallback {
            tiers.push(Arc::new(SyntheticTier::new()));
        } else {
            info!("Synthetic fallback disabled; exhausted searches will fail");
        }
        Self::with_tiers(tiers, store, settings.limits)
    }

    /// Custom cascade, tried in the given order.
    ///
    /// Synthetic point lookups are enabled exactly when one of the tiers is
    /// synthetic.
    pub fn with_tiers(
        tiers: Vec<Arc<dyn TierStrategy>>,
        store: Arc<dyn PaperStore>,
        limits: SearchLimits,
    ) -> Self {
        let synthetic_fallback = tiers.iter().any(|t| t.kind() == TierKind::Synthetic);
        Self {
            tiers,
            store,
            limits,
            synthetic_fallback,
        }
    }

    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    /// Plain search: winning tier's records, truncated to `limit`.
    pub async fn search(&self, text: &str, limit: usize) -> QueryResult<Resolution> {
        let query = SearchQuery::new(text, Some(limit));
        query.validate(&self.limits)?;

        let mut resolution = self.cascade(&query).await?;
        resolution.records.truncate(limit);
        Ok(resolution)
    }

    /// Threshold-filtered search: drop records scoring below `threshold`.
    ///
    /// Fetches up to the candidate cap; there is no caller-supplied limit.
    pub async fn semantic_search(&self, text: &str, threshold: f32) -> QueryResult<Resolution> {
        let query = SearchQuery::new(text, Some(self.limits.candidate_cap)).with_threshold(threshold);
        query.validate(&self.limits)?;

        let mut resolution = self.cascade(&query).await?;
        resolution
            .records
            .retain(|record| record.relevance_score >= threshold);
        resolution.records.truncate(self.limits.candidate_cap);
        info!(
            "Found {} papers with relevance >= {}",
            resolution.count(),
            threshold
        );
        Ok(resolution)
    }

    /// Hybrid search: metadata filters applied to the winning tier's records,
    /// then truncated to `limit`.
    ///
    /// Filters are re-applied even when the tier pushed them down, which is
    /// harmless because filtering is idempotent.
    pub async fn hybrid_search(
        &self,
        text: &str,
        filters: Option<MetadataFilterSet>,
        limit: usize,
    ) -> QueryResult<Resolution> {
        SearchQuery::new(text, Some(limit)).validate(&self.limits)?;

        let fetch = limit.max(self.limits.candidate_cap);
        let query = SearchQuery::new(text, Some(fetch)).with_filters(filters);

        let mut resolution = self.cascade(&query).await?;
        filter::retain_matching(&mut resolution.records, query.filters.as_ref());
        resolution.records.truncate(limit);
        info!("Found {} papers with filters", resolution.count());
        Ok(resolution)
    }

    /// Point lookup against the local store.
    ///
    /// Not part of the cascade: the semantic index has no exact-match
    /// retrieval. A synthetic id is answered with a placeholder only when
    /// synthetic fallback is enabled and the store does not have it.
    pub async fn get_by_identifier(&self, entry_id: &str) -> QueryResult<Paper> {
        let entry_id = entry_id.trim();
        if entry_id.is_empty() {
            return Err(QueryError::InvalidQuery("Entry ID cannot be empty".to_string()));
        }

        let stored = self.store.get_paper(entry_id).await;
        let synthetic = || {
            if self.synthetic_fallback {
                synthetic_paper_for_id(entry_id)
            } else {
                None
            }
        };

        match stored {
            Ok(Some(paper)) => Ok(paper),
            Ok(None) => synthetic().ok_or_else(|| QueryError::NotFound(entry_id.to_string())),
            Err(e) => {
                warn!("Error retrieving paper {}: {}", entry_id, e);
                synthetic().ok_or_else(|| {
                    QueryError::ResolutionFailed("paper store unavailable".to_string())
                })
            }
        }
    }

    async fn cascade(&self, query: &SearchQuery) -> QueryResult<Resolution> {
        for tier in &self.tiers {
            let kind = tier.kind();
            debug!("Trying {} tier for '{}'", kind, query.text);

            match tier.attempt(query).await {
                Ok(records) => {
                    if kind == TierKind::Synthetic {
                        warn!(
                            "All search backends unavailable; answering '{}' with synthetic records",
                            query.text
                        );
                    } else {
                        debug!("{} tier answered with {} records", kind, records.len());
                    }
                    return Ok(Resolution { tier: kind, records });
                }
                Err(unavailable) => {
                    warn!("{}; falling through", unavailable);
                }
            }
        }

        Err(QueryError::ResolutionFailed(
            "all search tiers unavailable".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{ScoredPaper, SemanticIndexError, SemanticResult};
    use crate::storage::{StorageError, StorageResult};
    use crate::tier::{synthetic::is_synthetic_id, TierResult, TierUnavailable};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Tier that returns fixed records and counts its calls.
    struct StaticTier {
        kind: TierKind,
        records: Vec<PaperRecord>,
        calls: AtomicUsize,
    }

    impl StaticTier {
        fn new(kind: TierKind, records: Vec<PaperRecord>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                records,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TierStrategy for StaticTier {
        fn kind(&self) -> TierKind {
            self.kind
        }

        async fn attempt(&self, query: &SearchQuery) -> TierResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.iter().take(query.limit).cloned().collect())
        }
    }

    struct FailingTier {
        kind: TierKind,
        calls: AtomicUsize,
    }

    impl FailingTier {
        fn new(kind: TierKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TierStrategy for FailingTier {
        fn kind(&self) -> TierKind {
            self.kind
        }

        async fn attempt(&self, _query: &SearchQuery) -> TierResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TierUnavailable::new(self.kind, "backend down"))
        }
    }

    struct DownIndex;

    #[async_trait]
    impl SemanticIndex for DownIndex {
        async fn similarity_search(&self, _anchor: &str, _limit: usize) -> SemanticResult<Vec<ScoredPaper>> {
            Err(SemanticIndexError::Connection("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    // In-memory store with substring search, mirroring the SQLite semantics.
    struct MockStore {
        papers: Vec<Paper>,
        fail: bool,
    }

    impl MockStore {
        fn new(papers: Vec<Paper>) -> Arc<Self> {
            Arc::new(Self { papers, fail: false })
        }

        fn with_failure() -> Arc<Self> {
            Arc::new(Self {
                papers: Vec::new(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl PaperStore for MockStore {
        async fn search_text(
            &self,
            text: &str,
            filters: Option<&MetadataFilterSet>,
            limit: usize,
        ) -> StorageResult<Vec<Paper>> {
            if self.fail {
                return Err(StorageError::ConnectionError("mock store failure".to_string()));
            }
            let needle = text.to_lowercase();
            Ok(self
                .papers
                .iter()
                .filter(|p| {
                    p.title.to_lowercase().contains(&needle)
                        || p.summary.to_lowercase().contains(&needle)
                        || p.categories.to_lowercase().contains(&needle)
                })
                .filter(|p| filter::matches(p, filters))
                .take(limit)
                .cloned()
                .collect())
        }

        async fn get_paper(&self, entry_id: &str) -> StorageResult<Option<Paper>> {
            if self.fail {
                return Err(StorageError::ConnectionError("mock store failure".to_string()));
            }
            Ok(self.papers.iter().find(|p| p.entry_id == entry_id).cloned())
        }

        async fn count_papers(&self) -> StorageResult<usize> {
            Ok(self.papers.len())
        }
    }

    fn create_test_paper(id: &str, title: &str, authors: &str, year: Option<i32>) -> Paper {
        Paper {
            entry_id: id.to_string(),
            title: title.to_string(),
            summary: "Test abstract".to_string(),
            authors: authors.to_string(),
            published_date: year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 15)),
            pdf_url: None,
            categories: "cs.LG".to_string(),
        }
    }

    fn record(id: &str, authors: &str, score: f32) -> PaperRecord {
        PaperRecord::new(create_test_paper(id, "Paper", authors, Some(2022)), score)
    }

    fn standard_resolver(store: Arc<MockStore>) -> QueryResolver {
        QueryResolver::from_settings(&Settings::default(), Arc::new(DownIndex), store)
    }

    #[test]
    fn test_search_query_defaults() {
        let query = SearchQuery::new("test query", None);
        assert_eq!(query.limit, 10);
        assert_eq!(query.threshold, 0.0);
        assert!(query.filters.is_none());
        assert!(SearchQuery::new("q", None)
            .with_filters(Some(MetadataFilterSet::default()))
            .filters
            .is_none());
    }

    #[test]
    fn test_validation() {
        let limits = SearchLimits::default();
        assert!(SearchQuery::new("ok", Some(10)).validate(&limits).is_ok());
        assert!(SearchQuery::new("   \t", Some(10)).validate(&limits).is_err());
        assert!(SearchQuery::new("ok", Some(0)).validate(&limits).is_err());
        assert!(SearchQuery::new("ok", Some(101)).validate(&limits).is_err());
        assert!(SearchQuery::new("x".repeat(501), Some(10)).validate(&limits).is_err());
        assert!(SearchQuery::new("ok", Some(10)).with_threshold(1.5).validate(&limits).is_err());
        assert!(SearchQuery::new("ok", Some(10)).with_threshold(f32::NAN).validate(&limits).is_err());
    }

    #[tokio::test]
    async fn test_invalid_query_runs_no_tier() {
        let primary = FailingTier::new(TierKind::Semantic);
        let resolver = QueryResolver::with_tiers(
            vec![primary.clone(), Arc::new(SyntheticTier::new())],
            MockStore::new(vec![]),
            SearchLimits::default(),
        );
        let err = resolver.search("  ", 5).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_to_lexical() {
        let store = MockStore::new(vec![
            create_test_paper("nn-1", "Neural Networks for Vision", "Alice Smith", Some(2021)),
            create_test_paper("nn-2", "Deep Neural Networks", "Bob Lee", Some(2019)),
            create_test_paper("bo-1", "Bayesian Optimization", "Carol King", Some(2020)),
        ]);
        let resolver = standard_resolver(store);

        let resolution = resolver.search("neural networks", 10).await.unwrap();
        assert_eq!(resolution.tier, TierKind::Lexical);
        let ids: Vec<&str> = resolution.records.iter().map(|r| r.entry_id()).collect();
        assert_eq!(ids, vec!["nn-1", "nn-2"]);
        assert!(resolution
            .records
            .iter()
            .all(|r| r.relevance_score == crate::relevance::LEXICAL_MATCH_RELEVANCE));
        assert!(!resolution.records.iter().any(|r| is_synthetic_id(r.entry_id())));
    }

    #[tokio::test]
    async fn test_empty_answer_stops_cascade() {
        let resolver = standard_resolver(MockStore::new(vec![create_test_paper(
            "bo-1",
            "Bayesian Optimization",
            "",
            None,
        )]));
        let resolution = resolver.search("quantum chromodynamics", 10).await.unwrap();
        assert_eq!(resolution.tier, TierKind::Lexical);
        assert!(resolution.records.is_empty());
    }

    #[tokio::test]
    async fn test_full_fallback_returns_synthetic() {
        let resolver = standard_resolver(MockStore::with_failure());
        let resolution = resolver.search("anything", 5).await.unwrap();

        assert_eq!(resolution.tier, TierKind::Synthetic);
        assert!(resolution.is_synthetic());
        assert_eq!(resolution.count(), 5);
        assert!(resolution.records.iter().all(|r| is_synthetic_id(r.entry_id())));
        for pair in resolution.records.windows(2) {
            assert!(pair[0].relevance_score > pair[1].relevance_score);
        }
    }

    #[tokio::test]
    async fn test_higher_tier_short_circuits_lower_tiers() {
        let primary = StaticTier::new(TierKind::Semantic, vec![record("a", "", 0.9)]);
        let secondary = FailingTier::new(TierKind::Lexical);
        let resolver = QueryResolver::with_tiers(
            vec![primary.clone(), secondary.clone()],
            MockStore::new(vec![]),
            SearchLimits::default(),
        );

        let resolution = resolver.search("q", 3).await.unwrap();
        assert_eq!(resolution.tier, TierKind::Semantic);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plain_search_truncates() {
        let primary = StaticTier::new(
            TierKind::Semantic,
            (0..8).map(|i| record(&format!("p{}", i), "", 0.9)).collect(),
        );
        let resolver =
            QueryResolver::with_tiers(vec![primary], MockStore::new(vec![]), SearchLimits::default());
        let resolution = resolver.search("q", 3).await.unwrap();
        let ids: Vec<&str> = resolution.records.iter().map(|r| r.entry_id()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2"]);
    }

    #[tokio::test]
    async fn test_threshold_filtering_keeps_order() {
        let primary = StaticTier::new(
            TierKind::Semantic,
            vec![record("high", "", 0.9), record("mid", "", 0.6), record("low", "", 0.3)],
        );
        let resolver =
            QueryResolver::with_tiers(vec![primary], MockStore::new(vec![]), SearchLimits::default());

        let resolution = resolver.semantic_search("q", 0.5).await.unwrap();
        let ids: Vec<&str> = resolution.records.iter().map(|r| r.entry_id()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
    }

    #[tokio::test]
    async fn test_threshold_out_of_range_is_invalid() {
        let resolver = standard_resolver(MockStore::new(vec![]));
        let err = resolver.semantic_search("q", 1.2).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_hybrid_filters_winning_tier_case_insensitively() {
        let primary = StaticTier::new(
            TierKind::Semantic,
            vec![record("alice", "Alice Smith", 0.8), record("bob", "Bob Lee", 0.7)],
        );
        let resolver =
            QueryResolver::with_tiers(vec![primary], MockStore::new(vec![]), SearchLimits::default());

        let filters = MetadataFilterSet {
            authors: Some("smith".to_string()),
            ..Default::default()
        };
        let resolution = resolver.hybrid_search("q", Some(filters), 10).await.unwrap();
        let ids: Vec<&str> = resolution.records.iter().map(|r| r.entry_id()).collect();
        assert_eq!(ids, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_hybrid_year_filter_excludes_undated() {
        let undated = PaperRecord::new(create_test_paper("undated", "Paper", "", None), 0.9);
        let primary = StaticTier::new(TierKind::Semantic, vec![undated, record("dated", "", 0.8)]);
        let resolver =
            QueryResolver::with_tiers(vec![primary], MockStore::new(vec![]), SearchLimits::default());

        let filters = MetadataFilterSet {
            min_year: Some(2020),
            ..Default::default()
        };
        let resolution = resolver.hybrid_search("q", Some(filters), 10).await.unwrap();
        let ids: Vec<&str> = resolution.records.iter().map(|r| r.entry_id()).collect();
        assert_eq!(ids, vec!["dated"]);
    }

    #[tokio::test]
    async fn test_hybrid_on_synthetic_tier_is_filtered_and_limited() {
        let resolver = standard_resolver(MockStore::with_failure());
        let filters = MetadataFilterSet {
            authors: Some("nobody-real".to_string()),
            ..Default::default()
        };
        let resolution = resolver.hybrid_search("q", Some(filters), 10).await.unwrap();
        assert_eq!(resolution.tier, TierKind::Synthetic);
        assert!(resolution.records.is_empty());

        let resolution = resolver.hybrid_search("q", None, 7).await.unwrap();
        assert_eq!(resolution.count(), 7);
    }

    #[tokio::test]
    async fn test_disabled_synthetic_surfaces_failure() {
        let settings = Settings {
            synthetic_fallback: false,
            ..Settings::default()
        };
        let resolver =
            QueryResolver::from_settings(&settings, Arc::new(DownIndex), MockStore::with_failure());
        let err = resolver.search("anything", 5).await.unwrap_err();
        assert!(matches!(err, QueryError::ResolutionFailed(_)));

        let err = resolver.get_by_identifier("synthetic-anything-1").await.unwrap_err();
        assert!(matches!(err, QueryError::ResolutionFailed(_)));
    }

    #[tokio::test]
    async fn test_get_by_identifier() {
        let resolver = standard_resolver(MockStore::new(vec![create_test_paper(
            "2101.00001",
            "Stored",
            "Alice Smith",
            Some(2021),
        )]));

        let paper = resolver.get_by_identifier(" 2101.00001 ").await.unwrap();
        assert_eq!(paper.title, "Stored");

        let err = resolver.get_by_identifier("does-not-exist").await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound(id) if id == "does-not-exist"));

        let paper = resolver.get_by_identifier("synthetic-anything-2").await.unwrap();
        assert_eq!(paper.entry_id, "synthetic-anything-2");

        let err = resolver.get_by_identifier("   ").await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_get_by_identifier_store_down() {
        let resolver = standard_resolver(MockStore::with_failure());
        let err = resolver.get_by_identifier("2101.00001").await.unwrap_err();
        assert!(matches!(err, QueryError::ResolutionFailed(_)));

        let paper = resolver.get_by_identifier("synthetic-q-1").await.unwrap();
        assert!(is_synthetic_id(&paper.entry_id));
    }
}

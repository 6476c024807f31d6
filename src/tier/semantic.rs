//! Primary tier: similarity search against the semantic index.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{TierKind, TierResult, TierStrategy, TierUnavailable};
use crate::models::PaperRecord;
use crate::query::SearchQuery;
use crate::relevance::{normalize, RelevanceSignal};
use crate::semantic::SemanticIndex;

/// Ranks papers by embedding distance to the query text.
///
/// Metadata filters are not pushed down here; the index's metadata is not
/// efficiently filterable, so the resolver filters afterwards.
pub struct SemanticTier {
    index: Arc<dyn SemanticIndex>,
}

impl SemanticTier {
    pub fn new(index: Arc<dyn SemanticIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl TierStrategy for SemanticTier {
    fn kind(&self) -> TierKind {
        TierKind::Semantic
    }

    async fn attempt(&self, query: &SearchQuery) -> TierResult {
        debug!("Semantic search via {} for '{}'", self.index.name(), query.text);

        let rows = self
            .index
            .similarity_search(&query.text, query.limit)
            .await
            .map_err(|e| {
                warn!("Error querying semantic index: {}", e);
                TierUnavailable::new(self.kind(), e)
            })?;

        let records: Vec<PaperRecord> = rows
            .into_iter()
            .take(query.limit)
            .map(|row| PaperRecord::new(row.paper, normalize(RelevanceSignal::Distance(row.distance))))
            .collect();

        info!("Found {} papers semantically similar to '{}'", records.len(), query.text);
        Ok(records)
    }
}

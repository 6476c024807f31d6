//! Secondary tier: substring search against the local paper store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{TierKind, TierResult, TierStrategy, TierUnavailable};
use crate::models::PaperRecord;
use crate::query::SearchQuery;
use crate::relevance::{normalize, RelevanceSignal};
use crate::storage::PaperStore;

/// Case-insensitive substring match over title, summary and categories.
///
/// All metadata filters are pushed down to the store. There is no ranking
/// signal, so every hit gets the same lexical relevance.
pub struct LexicalTier {
    store: Arc<dyn PaperStore>,
}

impl LexicalTier {
    pub fn new(store: Arc<dyn PaperStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TierStrategy for LexicalTier {
    fn kind(&self) -> TierKind {
        TierKind::Lexical
    }

    async fn attempt(&self, query: &SearchQuery) -> TierResult {
        debug!("Falling back to text search for '{}'", query.text);

        let papers = self
            .store
            .search_text(&query.text, query.filters.as_ref(), query.limit)
            .await
            .map_err(|e| {
                warn!("Error with text search fallback: {}", e);
                TierUnavailable::new(self.kind(), e)
            })?;

        let relevance = normalize(RelevanceSignal::LexicalMatch);
        let records: Vec<PaperRecord> = papers
            .into_iter()
            .take(query.limit)
            .map(|paper| PaperRecord::new(paper, relevance))
            .collect();

        info!("Found {} papers matching '{}' (text search)", records.len(), query.text);
        Ok(records)
    }
}

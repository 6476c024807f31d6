//! Tertiary tier: synthetic placeholder records.
//!
//! Answers when every real backend is down so callers always get a result
//! list. The records carry no bibliographic meaning. Every one of them has an
//! entry id starting with [`SYNTHETIC_ID_PREFIX`], which real ids never use,
//! and the resolver reports the answering tier as [`TierKind::Synthetic`].

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use super::{TierKind, TierResult, TierStrategy};
use crate::models::{Paper, PaperRecord};
use crate::query::SearchQuery;
use crate::relevance::{normalize, RelevanceSignal};

/// Reserved prefix for synthetic entry ids.
pub const SYNTHETIC_ID_PREFIX: &str = "synthetic-";

const SLUG_MAX_LEN: usize = 48;

/// Whether an entry id follows the synthetic naming convention.
pub fn is_synthetic_id(entry_id: &str) -> bool {
    entry_id
        .strip_prefix(SYNTHETIC_ID_PREFIX)
        .is_some_and(|rest| !rest.is_empty())
}

/// Lowercase ASCII alphanumerics joined by single dashes.
fn slug(text: &str) -> String {
    let mut slug = String::new();
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word.to_ascii_lowercase());
        if slug.len() >= SLUG_MAX_LEN {
            slug.truncate(SLUG_MAX_LEN);
            break;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug
    }
}

fn placeholder_date() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 1, 1)
}

fn placeholder(entry_id: String, title: String, summary: String) -> Paper {
    Paper {
        entry_id,
        title,
        summary,
        authors: "Placeholder Author".to_string(),
        published_date: placeholder_date(),
        pdf_url: None,
        categories: "cs.LG, cs.AI".to_string(),
    }
}

/// Deterministic placeholders for `query_text`, ranks `1..=count`.
pub fn synthetic_papers(query_text: &str, count: usize) -> Vec<Paper> {
    let slug = slug(query_text);
    (1..=count)
        .map(|rank| {
            placeholder(
                format!("{}{}-{}", SYNTHETIC_ID_PREFIX, slug, rank),
                format!("[Synthetic] Sample Paper {}: {}", rank, query_text),
                format!(
                    "Placeholder result {} for \"{}\". No search backend was available, \
                     so this record does not describe a real paper.",
                    rank, query_text
                ),
            )
        })
        .collect()
}

/// Placeholder for a point lookup of a synthetic id.
///
/// Returns `None` for ids outside the synthetic convention.
pub fn synthetic_paper_for_id(entry_id: &str) -> Option<Paper> {
    if !is_synthetic_id(entry_id) {
        return None;
    }
    Some(placeholder(
        entry_id.to_string(),
        format!("[Synthetic] Sample Paper for {}", entry_id),
        "Placeholder record. This id was produced by the synthetic fallback and does not \
         describe a real paper."
            .to_string(),
    ))
}

/// The never-failing last tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticTier;

impl SyntheticTier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TierStrategy for SyntheticTier {
    fn kind(&self) -> TierKind {
        TierKind::Synthetic
    }

    async fn attempt(&self, query: &SearchQuery) -> TierResult {
        warn!("Returning {} synthetic records for '{}'", query.limit, query.text);
        Ok(synthetic_papers(&query.text, query.limit)
            .into_iter()
            .enumerate()
            .map(|(rank, paper)| PaperRecord::new(paper, normalize(RelevanceSignal::SyntheticRank(rank))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Neural Networks!"), "neural-networks");
        assert_eq!(slug("  "), "query");
        assert_eq!(slug("日本語"), "query");
        assert!(slug(&"word ".repeat(40)).len() <= SLUG_MAX_LEN);
        assert!(!slug(&"abcdefg ".repeat(10)).ends_with('-'));
    }

    #[test]
    fn test_ids_are_deterministic_and_recognizable() {
        let first = synthetic_papers("graph neural nets", 3);
        let second = synthetic_papers("graph neural nets", 3);
        assert_eq!(first, second);
        assert_eq!(first[0].entry_id, "synthetic-graph-neural-nets-1");
        assert!(first.iter().all(|p| is_synthetic_id(&p.entry_id)));
        assert!(first[2].title.contains("graph neural nets"));
    }

    #[test]
    fn test_is_synthetic_id() {
        assert!(is_synthetic_id("synthetic-query-1"));
        assert!(!is_synthetic_id("synthetic-"));
        assert!(!is_synthetic_id("does-not-exist"));
        assert!(!is_synthetic_id("2101.00001"));
    }

    #[test]
    fn test_synthetic_paper_for_id() {
        assert!(synthetic_paper_for_id("does-not-exist").is_none());
        let paper = synthetic_paper_for_id("synthetic-x-1").unwrap();
        assert_eq!(paper.entry_id, "synthetic-x-1");
    }

    #[tokio::test]
    async fn test_attempt_never_fails_and_scores_decrease() {
        let records = SyntheticTier::new()
            .attempt(&SearchQuery::new("anything", Some(5)))
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
        for pair in records.windows(2) {
            assert!(pair[0].relevance_score > pair[1].relevance_score);
        }
        assert!(records.iter().all(|r| r.relevance_score > 0.0));
    }
}

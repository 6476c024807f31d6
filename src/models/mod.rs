//! Core data models for the paper search system.
//!
//! This module contains the data structures shared by every search tier:
//! bibliographic paper metadata, scored search records, and the structured
//! metadata filters that can be attached to a query.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Bibliographic metadata for a single paper.
///
/// This is the shape both backends return before any relevance is attached.
/// It is also what a point lookup returns, since an exact identifier match
/// carries no relevance signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Stable unique identifier (e.g. an arXiv entry id)
    pub entry_id: String,

    /// Paper title
    pub title: String,

    /// Abstract / summary text
    pub summary: String,

    /// Comma-joined author names, may be empty
    #[serde(default)]
    pub authors: String,

    /// Publication date, if known and parseable
    #[serde(default)]
    pub published_date: Option<NaiveDate>,

    /// Link to the PDF
    #[serde(default)]
    pub pdf_url: Option<String>,

    /// Comma-joined category tags (e.g. "cs.LG, cs.AI"), may be empty
    #[serde(default)]
    pub categories: String,
}

impl Paper {
    /// Publication year, when a date is present.
    pub fn publication_year(&self) -> Option<i32> {
        self.published_date.map(|date| date.year())
    }
}

/// A paper candidate produced by one search tier, with its unified relevance.
///
/// `relevance_score` is always in `[0, 1]`. Scores are only ordered
/// meaningfully within the output of a single tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperRecord {
    /// The paper metadata
    #[serde(flatten)]
    pub paper: Paper,

    /// Unified relevance score (1.0 = best possible match for the tier's method)
    pub relevance_score: f32,
}

impl PaperRecord {
    /// Create a new record from a paper and an already-normalized relevance.
    pub fn new(paper: Paper, relevance_score: f32) -> Self {
        Self {
            paper,
            relevance_score: relevance_score.clamp(0.0, 1.0),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.paper.entry_id
    }
}

/// Optional structured constraints attached to a query.
///
/// An absent field imposes no constraint; all present fields are combined
/// with logical AND. See [`crate::filter::matches`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataFilterSet {
    /// Case-insensitive substring matched against `Paper::authors`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,

    /// Minimum publication year (inclusive)
    #[serde(default, alias = "year", skip_serializing_if = "Option::is_none")]
    pub min_year: Option<i32>,

    /// Case-insensitive substring matched against `Paper::categories`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<String>,
}

impl MetadataFilterSet {
    /// True when no field constrains anything.
    pub fn is_empty(&self) -> bool {
        self.authors.is_none() && self.min_year.is_none() && self.categories.is_none()
    }
}

/// Parse a publication date as the backends render it.
///
/// Accepts plain dates (`2021-03-04`), SQL timestamps
/// (`2021-03-04 10:00:00`), RFC 3339 and a bare year (`2021`, read as
/// January 1st). Anything else yields `None`, which makes the record fail a
/// minimum-year filter.
pub fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(ts.date());
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
        return raw
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(date: Option<NaiveDate>) -> Paper {
        Paper {
            entry_id: "2101.00001".to_string(),
            title: "Attention Everywhere".to_string(),
            summary: "A summary".to_string(),
            authors: "Alice Smith".to_string(),
            published_date: date,
            pdf_url: None,
            categories: "cs.LG".to_string(),
        }
    }

    #[test]
    fn test_parse_published_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4);
        assert_eq!(parse_published_date("2021-03-04"), expected);
        assert_eq!(parse_published_date("2021-03-04 10:11:12"), expected);
        assert_eq!(parse_published_date("2021-03-04T10:11:12Z"), expected);
        assert_eq!(parse_published_date("2021"), NaiveDate::from_ymd_opt(2021, 1, 1));
    }

    #[test]
    fn test_parse_published_date_rejects_garbage() {
        assert_eq!(parse_published_date(""), None);
        assert_eq!(parse_published_date("   "), None);
        assert_eq!(parse_published_date("last tuesday"), None);
        assert_eq!(parse_published_date("20x1"), None);
    }

    #[test]
    fn test_publication_year() {
        assert_eq!(paper(NaiveDate::from_ymd_opt(2019, 7, 1)).publication_year(), Some(2019));
        assert_eq!(paper(None).publication_year(), None);
    }

    #[test]
    fn test_record_clamps_relevance() {
        assert_eq!(PaperRecord::new(paper(None), 1.7).relevance_score, 1.0);
        assert_eq!(PaperRecord::new(paper(None), -0.2).relevance_score, 0.0);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = PaperRecord::new(paper(None), 0.5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["entry_id"], "2101.00001");
        assert_eq!(json["relevance_score"], 0.5);
    }

    #[test]
    fn test_filter_set_accepts_year_alias() {
        let filters: MetadataFilterSet =
            serde_json::from_str(r#"{"authors": "smith", "year": 2020}"#).unwrap();
        assert_eq!(filters.authors.as_deref(), Some("smith"));
        assert_eq!(filters.min_year, Some(2020));
        assert!(filters.categories.is_none());
        assert!(!filters.is_empty());
        assert!(MetadataFilterSet::default().is_empty());
    }
}

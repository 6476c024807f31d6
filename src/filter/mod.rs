//! Metadata filter evaluation.
//!
//! The same predicates are used two ways: pushed down into the lexical store
//! as SQL constraints (see [`crate::storage::sqlite`]), and applied in memory
//! by the resolver to whatever tier answered. Applying them in memory is
//! idempotent, so records that were already filtered by the backend are
//! never discarded a second time.

use crate::models::{MetadataFilterSet, Paper, PaperRecord};

/// Check a paper against an optional filter set.
///
/// Returns `true` when `filters` is `None` or when every present predicate
/// holds. A paper without a publication date fails any `min_year` filter.
pub fn matches(paper: &Paper, filters: Option<&MetadataFilterSet>) -> bool {
    let Some(filters) = filters else {
        return true;
    };

    author_matches(paper, filters.authors.as_deref())
        && year_matches(paper, filters.min_year)
        && category_matches(paper, filters.categories.as_deref())
}

/// Keep only the records whose paper satisfies `filters`, preserving order.
pub fn retain_matching(records: &mut Vec<PaperRecord>, filters: Option<&MetadataFilterSet>) {
    if filters.is_none() {
        return;
    }
    records.retain(|record| matches(&record.paper, filters));
}

fn author_matches(paper: &Paper, needle: Option<&str>) -> bool {
    needle.map_or(true, |needle| contains_ignore_case(&paper.authors, needle))
}

fn year_matches(paper: &Paper, min_year: Option<i32>) -> bool {
    match min_year {
        None => true,
        Some(min_year) => paper
            .publication_year()
            .is_some_and(|year| year >= min_year),
    }
}

fn category_matches(paper: &Paper, needle: Option<&str>) -> bool {
    needle.map_or(true, |needle| contains_ignore_case(&paper.categories, needle))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn paper(authors: &str, year: Option<i32>, categories: &str) -> Paper {
        Paper {
            entry_id: format!("id-{}", authors.len()),
            title: "A title".to_string(),
            summary: "A summary".to_string(),
            authors: authors.to_string(),
            published_date: year.and_then(|y| NaiveDate::from_ymd_opt(y, 6, 1)),
            pdf_url: None,
            categories: categories.to_string(),
        }
    }

    fn filters(authors: Option<&str>, min_year: Option<i32>, categories: Option<&str>) -> MetadataFilterSet {
        MetadataFilterSet {
            authors: authors.map(str::to_string),
            min_year,
            categories: categories.map(str::to_string),
        }
    }

    #[test]
    fn test_absent_filters_match_everything() {
        let p = paper("", None, "");
        assert!(matches(&p, None));
        assert!(matches(&p, Some(&MetadataFilterSet::default())));
    }

    #[test]
    fn test_author_substring_is_case_insensitive() {
        let alice = paper("Alice Smith, Carol King", Some(2021), "cs.LG");
        let bob = paper("Bob Lee", Some(2021), "cs.LG");
        let f = filters(Some("SMITH"), None, None);
        assert!(matches(&alice, Some(&f)));
        assert!(!matches(&bob, Some(&f)));
    }

    #[test]
    fn test_min_year_is_inclusive() {
        let f = filters(None, Some(2020), None);
        assert!(matches(&paper("A", Some(2020), ""), Some(&f)));
        assert!(matches(&paper("A", Some(2023), ""), Some(&f)));
        assert!(!matches(&paper("A", Some(2019), ""), Some(&f)));
    }

    #[test]
    fn test_missing_date_fails_year_filter() {
        let undated = paper("A", None, "cs.AI");
        assert!(!matches(&undated, Some(&filters(None, Some(1900), None))));
        assert!(matches(&undated, Some(&filters(None, None, Some("cs.ai")))));
    }

    #[test]
    fn test_predicates_are_anded() {
        let p = paper("Alice Smith", Some(2022), "cs.CV, cs.LG");
        assert!(matches(&p, Some(&filters(Some("alice"), Some(2021), Some("cs.cv")))));
        assert!(!matches(&p, Some(&filters(Some("alice"), Some(2023), Some("cs.cv")))));
        assert!(!matches(&p, Some(&filters(Some("alice"), Some(2021), Some("stat.ML")))));
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let f = filters(Some("smith"), Some(2020), None);
        let mut records = vec![
            PaperRecord::new(paper("Alice Smith", Some(2021), ""), 0.9),
            PaperRecord::new(paper("Bob Lee", Some(2021), ""), 0.8),
            PaperRecord::new(paper("Jo Smith", None, ""), 0.7),
        ];
        retain_matching(&mut records, Some(&f));
        let once = records.clone();
        retain_matching(&mut records, Some(&f));
        assert_eq!(once, records);
        assert_eq!(records.len(), 1);

        for record in &once {
            assert_eq!(matches(&record.paper, Some(&f)), matches(&record.paper, Some(&f)));
        }
    }
}

//! Relevance normalization.
//!
//! Each search tier reports a different native signal: the semantic index
//! returns a distance, the lexical store only knows match / no match, and the
//! synthetic fallback only has a rank. This module maps all of them onto one
//! `[0, 1]` scale where 1.0 means "best possible match for this tier's method".
//!
//! The mappings are linear approximations, not calibrated probabilities. Two
//! scores from different tiers being equal says nothing about the underlying
//! methods being equally good.

/// Distance at (or beyond) which a semantic match is considered irrelevant.
///
/// The semantic index reports distances in `[0, 2]` (cosine distance), so
/// distance 0 maps to relevance 1.0 and distance 2 maps to 0.0.
pub const MAX_DISTANCE_FOR_NORMALIZATION: f64 = 2.0;

/// Constant relevance assigned to every lexical (substring) match.
pub const LEXICAL_MATCH_RELEVANCE: f32 = 0.75;

/// Relevance of the first synthetic placeholder.
pub const SYNTHETIC_TOP_RELEVANCE: f32 = 0.95;

/// Per-rank multiplicative decay for synthetic placeholders.
pub const SYNTHETIC_DECAY: f32 = 0.97;

/// Floor for synthetic relevance. Decay never reaches it for any rank the
/// resolver can request, so scores stay strictly decreasing.
const SYNTHETIC_FLOOR: f32 = 0.01;

/// A tier-native relevance signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelevanceSignal {
    /// Backend distance, lower is more similar.
    Distance(f64),
    /// The record matched a substring predicate; no continuous signal exists.
    LexicalMatch,
    /// Zero-based rank within a synthetic fallback batch.
    SyntheticRank(usize),
}

/// Map a tier-native signal to a relevance score in `[0, 1]`.
///
/// Out-of-range inputs are clamped, never rejected. A NaN distance is
/// treated as maximally distant.
pub fn normalize(signal: RelevanceSignal) -> f32 {
    match signal {
        RelevanceSignal::Distance(distance) => distance_to_relevance(distance),
        RelevanceSignal::LexicalMatch => LEXICAL_MATCH_RELEVANCE,
        RelevanceSignal::SyntheticRank(rank) => synthetic_relevance(rank),
    }
}

/// `clamp(1 - distance / D_max, 0, 1)`.
pub fn distance_to_relevance(distance: f64) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    let relevance = 1.0 - distance / MAX_DISTANCE_FOR_NORMALIZATION;
    relevance.clamp(0.0, 1.0) as f32
}

/// Geometric decay from [`SYNTHETIC_TOP_RELEVANCE`], bounded below by a small
/// positive floor.
pub fn synthetic_relevance(rank: usize) -> f32 {
    let exponent = i32::try_from(rank).unwrap_or(i32::MAX);
    (SYNTHETIC_TOP_RELEVANCE * SYNTHETIC_DECAY.powi(exponent)).max(SYNTHETIC_FLOOR)
}

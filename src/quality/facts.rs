//! Fact-check heuristic: how many checkable claims the article makes, and
//! how many of them carry an attribution.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::stats::sentences;

static CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:[.,]\d+)?\s*(%|percent|million|billion|times|x\b|years?|users|people)?")
        .expect("valid regex")
});

const ATTRIBUTION_MARKERS: &[&str] = &[
    "according to",
    "reported",
    "reports",
    "found that",
    "study",
    "survey",
    "data from",
    "source:",
    "http",
    "(20",
    "(19",
];

/// Claims per hundred words that earns the full density component.
const TARGET_DENSITY: f64 = 2.5;

/// Result of the fact-check heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckResult {
    /// 0-100.
    pub score: f64,
    /// Sentences containing a number or statistic.
    pub claim_count: usize,
    /// Claims with an attribution marker in the same sentence.
    pub attributed_count: usize,
    /// Claims per hundred words.
    pub density: f64,
}

/// Scores plain text (tags stripped, links kept as text) for fact density
/// and attribution.
pub fn check_facts(plain: &str, word_count: usize) -> FactCheckResult {
    let mut claim_count = 0;
    let mut attributed_count = 0;

    for sentence in sentences(plain) {
        if !CLAIM_RE.is_match(sentence) {
            continue;
        }
        claim_count += 1;
        let lower = sentence.to_lowercase();
        if ATTRIBUTION_MARKERS.iter().any(|m| lower.contains(m)) {
            attributed_count += 1;
        }
    }

    if claim_count == 0 {
        return FactCheckResult {
            score: 40.0,
            claim_count,
            attributed_count,
            density: 0.0,
        };
    }

    let density = claim_count as f64 * 100.0 / word_count.max(1) as f64;
    let density_component = (density / TARGET_DENSITY).min(1.0) * 50.0;
    let attribution_component = attributed_count as f64 / claim_count as f64 * 50.0;

    FactCheckResult {
        score: (density_component + attribution_component).clamp(0.0, 100.0),
        claim_count,
        attributed_count,
        density,
    }
}

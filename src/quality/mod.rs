//! Content quality scoring and review decisions.
//!
//! Scoring is a pure function of the article text:
//!
//! - [`eeat`] - experience, expertise, authoritativeness, trustworthiness
//! - [`facts`] - fact density and attribution
//! - [`review`] - grade, approve/flag/retry decision and the publish gate
//!
//! The composite is `round(0.7 * eeat_overall + 0.3 * fact_check)`.

pub mod eeat;
pub mod facts;
pub mod review;
pub mod stats;

pub use eeat::EeatScores;
pub use facts::{check_facts, FactCheckResult};
pub use review::{should_publish, Grade, PublishGate, QualityPolicy, ReviewDecision};
pub use stats::TextStats;

use serde::{Deserialize, Serialize};

use crate::utils::html::{remove_hidden_elements, strip_tags};

const EEAT_WEIGHT: f64 = 0.7;
const FACT_WEIGHT: f64 = 0.3;

/// Sub-scores below this trigger a recommendation.
const RECOMMENDATION_FLOOR: f64 = 60.0;

/// Full scoring result for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScoreResult {
    pub eeat: EeatScores,
    pub fact_check: FactCheckResult,
    /// Composite score, 0-100.
    pub composite: u32,
    pub grade: Grade,
    pub recommendations: Vec<String>,
    pub stats: TextStats,
}

/// Scores HTML or markdown article content.
///
/// Only visible text counts: embedded structured data and styles are
/// removed before any statistic is collected.
pub fn score_content(content: &str) -> QualityScoreResult {
    let visible = remove_hidden_elements(content);
    let stats = TextStats::collect(&visible);
    let plain = strip_tags(&visible);
    let lower = plain.to_lowercase();

    let eeat = EeatScores::score(&lower, &stats);
    let fact_check = check_facts(&plain, stats.word_count);

    let composite = (EEAT_WEIGHT * eeat.overall + FACT_WEIGHT * fact_check.score)
        .round()
        .clamp(0.0, 100.0) as u32;

    let recommendations = recommendations(&eeat, &fact_check, &stats);

    QualityScoreResult {
        grade: Grade::from_score(composite),
        eeat,
        fact_check,
        composite,
        recommendations,
        stats,
    }
}

fn recommendations(eeat: &EeatScores, facts: &FactCheckResult, stats: &TextStats) -> Vec<String> {
    let mut out = Vec::new();

    if eeat.experience < RECOMMENDATION_FLOOR {
        out.push("Add first-hand experience, concrete examples or a short case study".to_string());
    }
    if eeat.expertise < RECOMMENDATION_FLOOR {
        out.push("Deepen coverage with more sections, specifics and structured lists".to_string());
    }
    if eeat.authoritativeness < RECOMMENDATION_FLOOR {
        out.push("Cite reputable external sources and link to them".to_string());
    }
    if eeat.trustworthiness < RECOMMENDATION_FLOOR {
        out.push("Add dates, a sources section and balanced caveats; remove hype".to_string());
    }
    if facts.claim_count > 0 && facts.attributed_count < facts.claim_count {
        out.push(format!(
            "Attribute {} unsourced factual claim(s)",
            facts.claim_count - facts.attributed_count
        ));
    }
    if stats.heading_count < 2 {
        out.push("Break the article into at least two titled sections".to_string());
    }

    out
}

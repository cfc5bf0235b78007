//! E-E-A-T heuristics: experience, expertise, authoritativeness and
//! trustworthiness, each scored 0-100 from surface signals in the text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::stats::TextStats;

/// Weights applied to the four sub-scores.
pub const EXPERIENCE_WEIGHT: f64 = 0.20;
pub const EXPERTISE_WEIGHT: f64 = 0.30;
pub const AUTHORITATIVENESS_WEIGHT: f64 = 0.25;
pub const TRUSTWORTHINESS_WEIGHT: f64 = 0.25;

const EXPERIENCE_MARKERS: &[&str] = &[
    "i tested",
    "we tested",
    "in my experience",
    "in our experience",
    "hands-on",
    "i've used",
    "we've used",
    "i tried",
    "we tried",
    "personally",
    "our team",
    "first-hand",
];

const EXAMPLE_MARKERS: &[&str] = &["for example", "for instance", "case study", "such as"];

const CITATION_MARKERS: &[&str] = &[
    "according to",
    "research shows",
    "study",
    "survey",
    "published",
    "report",
    "data from",
];

const TRANSPARENCY_MARKERS: &[&str] = &[
    "disclaimer",
    "last updated",
    "last reviewed",
    "sources",
    "references",
    "we may earn",
];

const HYPE_MARKERS: &[&str] = &[
    "guaranteed",
    "100%",
    "miracle",
    "secret trick",
    "never fails",
    "overnight",
];

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"));

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:[.,]\d+)?%?").expect("valid regex"));

/// The four E-E-A-T sub-scores and their weighted overall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EeatScores {
    pub experience: f64,
    pub expertise: f64,
    pub authoritativeness: f64,
    pub trustworthiness: f64,
    pub overall: f64,
}

impl EeatScores {
    /// Scores lower-cased plain text with precomputed statistics.
    pub fn score(plain_lower: &str, stats: &TextStats) -> Self {
        let experience = experience_score(plain_lower);
        let expertise = expertise_score(plain_lower, stats);
        let authoritativeness = authoritativeness_score(plain_lower, stats);
        let trustworthiness = trustworthiness_score(plain_lower);

        let overall = experience * EXPERIENCE_WEIGHT
            + expertise * EXPERTISE_WEIGHT
            + authoritativeness * AUTHORITATIVENESS_WEIGHT
            + trustworthiness * TRUSTWORTHINESS_WEIGHT;

        Self {
            experience,
            expertise,
            authoritativeness,
            trustworthiness,
            overall,
        }
    }
}

fn count_markers(text: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| text.contains(*m)).count()
}

fn experience_score(text: &str) -> f64 {
    let mut score: f64 = 40.0;
    score += (count_markers(text, EXPERIENCE_MARKERS) as f64 * 8.0).min(40.0);
    score += (count_markers(text, EXAMPLE_MARKERS) as f64 * 5.0).min(20.0);
    score.min(100.0)
}

fn expertise_score(text: &str, stats: &TextStats) -> f64 {
    let mut score: f64 = 30.0;

    if stats.word_count >= 1500 {
        score += 20.0;
    } else if stats.word_count >= 800 {
        score += 10.0;
    }

    if stats.heading_count >= 4 {
        score += 15.0;
    } else if stats.heading_count >= 2 {
        score += 8.0;
    }

    if NUMBER_RE.find_iter(text).count() >= 5 {
        score += 10.0;
    }

    if stats.list_item_count > 0 {
        score += 10.0;
    }

    let avg = stats.avg_sentence_length();
    if (12.0..=25.0).contains(&avg) {
        score += 15.0;
    }

    score.min(100.0)
}

fn authoritativeness_score(text: &str, stats: &TextStats) -> f64 {
    let mut score: f64 = 30.0;
    score += (stats.external_link_count as f64 * 8.0).min(40.0);
    score += (count_markers(text, CITATION_MARKERS) as f64 * 6.0).min(30.0);
    score.min(100.0)
}

fn trustworthiness_score(text: &str) -> f64 {
    let mut score: f64 = 40.0;

    if YEAR_RE.is_match(text) {
        score += 15.0;
    }
    if count_markers(text, TRANSPARENCY_MARKERS) > 0 {
        score += 15.0;
    }
    if text.contains("faq") || text.contains("frequently asked") {
        score += 10.0;
    }
    if text.contains("however") || text.contains("on the other hand") || text.contains("drawback")
    {
        score += 10.0;
    }

    score -= count_markers(text, HYPE_MARKERS) as f64 * 5.0;
    score.clamp(0.0, 100.0)
}

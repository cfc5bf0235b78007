//! Review decision and publish gate.
//!
//! Maps a composite score onto approve / flag / retry under a campaign's
//! [`QualityPolicy`], and tells the orchestrator whether to publish.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::context::RunContext;

/// Letter grade for a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Inclusive lower bounds: A >= 90, B >= 75, C >= 60, D >= 40.
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => Grade::A,
            75..=89 => Grade::B,
            60..=74 => Grade::C,
            40..=59 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(s)
    }
}

/// Outcome of the automatic review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Publish normally.
    Approve,
    /// Publish, but mark the run for human attention.
    Flag,
    /// Do not publish; re-run the item.
    Retry,
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewDecision::Approve => write!(f, "approve"),
            ReviewDecision::Flag => write!(f, "flag"),
            ReviewDecision::Retry => write!(f, "retry"),
        }
    }
}

fn default_approve_threshold() -> u32 {
    75
}

fn default_retry_threshold() -> u32 {
    40
}

fn default_max_retries() -> u32 {
    1
}

/// Campaign-level review thresholds.
///
/// Whether the gate applies at all is the campaign's `stages.quality_gate`
/// toggle; the policy only maps scores to decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityPolicy {
    /// Scores at or above this are approved.
    #[serde(default = "default_approve_threshold")]
    pub approve_threshold: u32,
    /// Scores below this are retried.
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: u32,
    /// Additional whole-item attempts when the decision is retry.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            approve_threshold: default_approve_threshold(),
            retry_threshold: default_retry_threshold(),
            max_retries: default_max_retries(),
        }
    }
}

impl QualityPolicy {
    /// Decides what to do with a composite score.
    pub fn decide(&self, composite: u32) -> ReviewDecision {
        if composite >= self.approve_threshold {
            ReviewDecision::Approve
        } else if composite < self.retry_threshold {
            ReviewDecision::Retry
        } else {
            ReviewDecision::Flag
        }
    }
}

/// Whether a run may proceed to publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishGate {
    pub publish: bool,
    pub should_retry: bool,
    pub flagged: bool,
}

/// Reads the review decision off a run context.
///
/// A run without a decision (scoring disabled) publishes.
pub fn should_publish(ctx: &RunContext) -> PublishGate {
    match ctx.decision {
        None | Some(ReviewDecision::Approve) => PublishGate {
            publish: true,
            should_retry: false,
            flagged: false,
        },
        Some(ReviewDecision::Flag) => PublishGate {
            publish: true,
            should_retry: false,
            flagged: true,
        },
        Some(ReviewDecision::Retry) => PublishGate {
            publish: false,
            should_retry: true,
            flagged: false,
        },
    }
}

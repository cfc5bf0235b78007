//! The per-run context threaded through every stage.
//!
//! A [`RunContext`] is owned by exactly one pipeline invocation. Its status
//! only moves forward; a failed run stays failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::orchestrator::PipelineError;
use super::publish::PublishResult;
use super::status::TransitionEvent;
use crate::campaign::{AuthorProfile, SourceItem};
use crate::providers::HandlerKind;
use crate::quality::{QualityScoreResult, ReviewDecision};

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Researching,
    Generating,
    Imaging,
    Linking,
    Scoring,
    Publishing,
    Done,
    Failed,
    RetryRequested,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Researching => "researching",
            RunStatus::Generating => "generating",
            RunStatus::Imaging => "imaging",
            RunStatus::Linking => "linking",
            RunStatus::Scoring => "scoring",
            RunStatus::Publishing => "publishing",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
            RunStatus::RetryRequested => "retry_requested",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Done | RunStatus::Failed | RunStatus::RetryRequested
        )
    }

    fn rank(&self) -> u8 {
        match self {
            RunStatus::Pending => 0,
            RunStatus::Researching => 1,
            RunStatus::Generating => 2,
            RunStatus::Imaging => 3,
            RunStatus::Linking => 4,
            RunStatus::Scoring => 5,
            RunStatus::Publishing => 6,
            RunStatus::Done | RunStatus::Failed | RunStatus::RetryRequested => 7,
        }
    }

    /// Whether `next` is a legal successor.
    ///
    /// Optional stages may be skipped, so any strictly later stage is
    /// allowed. `failed` is reachable from any non-terminal state,
    /// `retry_requested` only from `scoring` and `done` only from
    /// `publishing`.
    pub fn can_advance_to(&self, next: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunStatus::Failed => true,
            RunStatus::RetryRequested => *self == RunStatus::Scoring,
            RunStatus::Done => *self == RunStatus::Publishing,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed output of the content generation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub slug: String,
    /// True when no heading was found and the topic became the title.
    pub used_fallback_title: bool,
    pub handler_used: HandlerKind,
}

/// Where an inline image goes in the article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    AfterIntro,
    AfterH2,
    BeforeConclusion,
}

impl Placement {
    const CYCLE: [Placement; 3] = [
        Placement::AfterIntro,
        Placement::AfterH2,
        Placement::BeforeConclusion,
    ];

    /// Placement for the 1-based inline index, cycling through the three anchors.
    pub fn for_inline(index: usize) -> Self {
        Self::CYCLE[index.saturating_sub(1) % Self::CYCLE.len()]
    }
}

/// An image slot to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSlot {
    Cover,
    Inline { index: usize, placement: Placement },
}

impl ImageSlot {
    /// Slots for a cover flag and inline count, cover first.
    pub fn plan(cover: bool, inline_count: usize) -> Vec<ImageSlot> {
        let mut slots = Vec::with_capacity(inline_count + 1);
        if cover {
            slots.push(ImageSlot::Cover);
        }
        for index in 1..=inline_count {
            slots.push(ImageSlot::Inline {
                index,
                placement: Placement::for_inline(index),
            });
        }
        slots
    }

    pub fn placement(&self) -> Option<Placement> {
        match self {
            ImageSlot::Cover => None,
            ImageSlot::Inline { placement, .. } => Some(*placement),
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSlot::Cover => write!(f, "cover"),
            ImageSlot::Inline { index, .. } => write!(f, "inline-{}", index),
        }
    }
}

/// An image chosen for a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquiredImage {
    pub slot: ImageSlot,
    pub url: String,
    pub alt: String,
    /// Handler or stock library that supplied it.
    pub source: String,
    pub photographer: Option<String>,
    pub score: Option<u32>,
}

/// A slot that could not be filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotFailure {
    pub slot: String,
    pub reason: String,
}

/// Output of the image stage. Partial success is a valid end state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImages {
    pub cover: Option<AcquiredImage>,
    pub inline: Vec<AcquiredImage>,
    pub failures: Vec<SlotFailure>,
}

impl GeneratedImages {
    pub fn is_empty(&self) -> bool {
        self.cover.is_none() && self.inline.is_empty()
    }

    pub fn failed_slots(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.slot.as_str()).collect()
    }

    /// Stores an image in its slot.
    pub fn place(&mut self, image: AcquiredImage) {
        match image.slot {
            ImageSlot::Cover => self.cover = Some(image),
            ImageSlot::Inline { .. } => self.inline.push(image),
        }
    }

    pub fn fail(&mut self, slot: ImageSlot, reason: impl Into<String>) {
        self.failures.push(SlotFailure {
            slot: slot.to_string(),
            reason: reason.into(),
        });
    }
}

/// Mutable record of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub campaign_id: String,
    pub target_site_id: String,
    pub source: SourceItem,
    status: RunStatus,
    pub research: Option<String>,
    pub content: Option<GeneratedContent>,
    pub images: GeneratedImages,
    pub quality: Option<QualityScoreResult>,
    pub decision: Option<ReviewDecision>,
    pub matched_author: Option<AuthorProfile>,
    pub publish: Option<PublishResult>,
    pub error: Option<String>,
    /// Notes from stages that degraded without failing the run.
    pub warnings: Vec<String>,
    /// 1-based attempt number across quality retries.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunContext {
    pub fn new(
        campaign_id: impl Into<String>,
        target_site_id: impl Into<String>,
        source: SourceItem,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            campaign_id: campaign_id.into(),
            target_site_id: target_site_id.into(),
            source,
            status: RunStatus::Pending,
            research: None,
            content: None,
            images: GeneratedImages::default(),
            quality: None,
            decision: None,
            matched_author: None,
            publish: None,
            error: None,
            warnings: Vec::new(),
            attempt: 1,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn topic(&self) -> &str {
        &self.source.topic
    }

    /// Moves to `next`, returning the event to report.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidTransition` for backwards moves and
    /// for any move out of a terminal state.
    pub fn advance(&mut self, next: RunStatus) -> Result<TransitionEvent, PipelineError> {
        if !self.status.can_advance_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let event = TransitionEvent {
            run_id: self.run_id,
            campaign_id: self.campaign_id.clone(),
            topic: self.source.topic.clone(),
            from: self.status,
            to: next,
            at: Utc::now(),
            detail: None,
        };

        self.status = next;
        self.updated_at = event.at;
        if next.is_terminal() {
            self.completed_at = Some(event.at);
        }
        Ok(event)
    }

    /// Moves to `failed` with a reason. Returns `None` if already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> Option<TransitionEvent> {
        let reason = reason.into();
        let mut event = self.advance(RunStatus::Failed).ok()?;
        event.detail = Some(reason.clone());
        self.error = Some(reason);
        Some(event)
    }

    /// Records a degraded-stage note.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(run_id = %self.run_id, topic = %self.source.topic, "{}", message);
        self.warnings.push(message);
    }
}

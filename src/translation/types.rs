//! Translation jobs, history records and outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::{HostError, LedgerError};
use crate::hosting::{PostFilters, PostStatus};
use crate::prompts::PromptError;
use crate::providers::{HandlerKind, InvokeError};

/// Errors raised by the translation pipeline.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid translation job '{id}': {message}")]
    InvalidJob { id: String, message: String },

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Invocation error: {0}")]
    Invoke(#[from] InvokeError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: TranslationStatus,
        to: TranslationStatus,
    },
}

/// Lifecycle of one translation work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Pending,
    Translating,
    Processing,
    Publishing,
    Published,
    Failed,
}

impl TranslationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStatus::Pending => "pending",
            TranslationStatus::Translating => "translating",
            TranslationStatus::Processing => "processing",
            TranslationStatus::Publishing => "publishing",
            TranslationStatus::Published => "published",
            TranslationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TranslationStatus::Published | TranslationStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            TranslationStatus::Pending => 0,
            TranslationStatus::Translating => 1,
            TranslationStatus::Processing => 2,
            TranslationStatus::Publishing => 3,
            TranslationStatus::Published | TranslationStatus::Failed => 4,
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: TranslationStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TranslationStatus::Failed => true,
            TranslationStatus::Published => *self == TranslationStatus::Publishing,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl fmt::Display for TranslationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranslationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TranslationStatus::Pending),
            "translating" => Ok(TranslationStatus::Translating),
            "processing" => Ok(TranslationStatus::Processing),
            "publishing" => Ok(TranslationStatus::Publishing),
            "published" => Ok(TranslationStatus::Published),
            "failed" => Ok(TranslationStatus::Failed),
            other => Err(format!("unknown translation status '{}'", other)),
        }
    }
}

/// One entry of the durable translation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub id: Uuid,
    pub job_id: String,
    pub source_post_id: u64,
    pub source_site_id: String,
    pub target_language: String,
    pub target_site_id: String,
    pub status: TranslationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub source_chars: usize,
    /// Names of the post-processing steps that were applied.
    pub applied_postprocess: Vec<String>,
    pub target_post_id: Option<u64>,
    pub target_link: Option<String>,
    pub error: Option<String>,
    pub failed_stage: Option<TranslationStatus>,
}

impl TranslationRecord {
    pub fn new(
        job_id: impl Into<String>,
        source_post_id: u64,
        source_site_id: impl Into<String>,
        target_language: impl Into<String>,
        target_site_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job_id.into(),
            source_post_id,
            source_site_id: source_site_id.into(),
            target_language: target_language.into(),
            target_site_id: target_site_id.into(),
            status: TranslationStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            source_chars: 0,
            applied_postprocess: Vec::new(),
            target_post_id: None,
            target_link: None,
            error: None,
            failed_stage: None,
        }
    }

    /// Moves the record forward.
    pub fn advance(&mut self, next: TranslationStatus) -> Result<(), TranslationError> {
        if !self.status.can_advance_to(next) {
            return Err(TranslationError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Marks the record failed, remembering the stage it failed in.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.failed_stage = Some(self.status);
        self.error = Some(error.into());
        self.status = TranslationStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Whether this record permanently covers the triple.
    pub fn covers(&self, source_post_id: u64, language: &str, target_site_id: &str) -> bool {
        self.status == TranslationStatus::Published
            && self.source_post_id == source_post_id
            && self.target_language.eq_ignore_ascii_case(language)
            && self.target_site_id == target_site_id
    }
}

fn default_true() -> bool {
    true
}

/// Post-processing applied to translated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessOptions {
    /// Point links at the source site to the target site.
    #[serde(default = "default_true")]
    pub rewrite_internal_links: bool,
    /// Derive the slug from the translated title.
    #[serde(default = "default_true")]
    pub localize_slug: bool,
    /// Wrap the body in an element carrying `lang`.
    #[serde(default = "default_true")]
    pub add_language_attribute: bool,
    /// Append a note linking back to the original.
    #[serde(default)]
    pub append_source_note: bool,
}

impl Default for PostProcessOptions {
    fn default() -> Self {
        Self {
            rewrite_internal_links: true,
            localize_slug: true,
            add_language_attribute: true,
            append_source_note: false,
        }
    }
}

/// One destination language/site pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationTarget {
    pub site_id: String,
    pub language: String,
    #[serde(default)]
    pub post_status: PostStatus,
    #[serde(default)]
    pub categories: Vec<u64>,
    /// Public base URL of the target site, for link rewriting.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_concurrency() -> usize {
    2
}

/// A translation job loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationJob {
    pub id: String,
    pub source_site_id: String,
    /// Public base URL of the source site, for link rewriting.
    #[serde(default)]
    pub source_base_url: Option<String>,
    #[serde(default)]
    pub source_language: Option<String>,
    #[serde(default)]
    pub source_filters: PostFilters,
    pub targets: Vec<TranslationTarget>,
    #[serde(default)]
    pub providers: Vec<HandlerKind>,
    #[serde(default)]
    pub postprocess: PostProcessOptions,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl TranslationJob {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TranslationError> {
        let job: TranslationJob = serde_yaml::from_str(yaml)?;
        job.validate()?;
        Ok(job)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TranslationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), TranslationError> {
        let invalid = |message: &str| TranslationError::InvalidJob {
            id: self.id.clone(),
            message: message.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id cannot be empty"));
        }
        if self.source_site_id.trim().is_empty() {
            return Err(invalid("source_site_id cannot be empty"));
        }
        if self.targets.is_empty() {
            return Err(invalid("at least one target is required"));
        }
        if self.targets.iter().any(|t| t.language.trim().is_empty()) {
            return Err(invalid("every target needs a language"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency must be greater than 0"));
        }
        Ok(())
    }
}

/// Final outcome of one (post, target) work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TranslationOutcome {
    Published { post_id: u64, link: String },
    Skipped { reason: String },
    Failed { stage: TranslationStatus, error: String },
}

/// Outcome of one work item with its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationItemReport {
    pub source_post_id: u64,
    pub target_language: String,
    pub target_site_id: String,
    #[serde(flatten)]
    pub outcome: TranslationOutcome,
}

/// Summary of a translation job run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationReport {
    pub job_id: String,
    pub items: Vec<TranslationItemReport>,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TranslationReport {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, item: TranslationItemReport) {
        match item.outcome {
            TranslationOutcome::Published { .. } => self.published += 1,
            TranslationOutcome::Skipped { .. } => self.skipped += 1,
            TranslationOutcome::Failed { .. } => self.failed += 1,
        }
        self.items.push(item);
    }
}

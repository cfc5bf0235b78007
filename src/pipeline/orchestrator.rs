//! Pipeline orchestrator for article production.
//!
//! This module provides the [`ContentPipeline`] that sequences one work item
//! through every stage:
//! - Dedup check against the ledger
//! - Research (optional) and content generation
//! - Image acquisition and enrichment side-pipelines (optional)
//! - Quality scoring and the publish gate
//! - Publication and the ledger write
//!
//! Every status change is reported to the injected sink and tracker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Semaphore;

use super::content::generate_article;
use super::context::{RunContext, RunStatus};
use super::dedup::{DedupDecision, DedupGate};
use super::enrich::{Enricher, InternalLinker, Rewriter, SchemaInjector};
use super::images::ImageAcquirer;
use super::publish::{PublishError, Publisher};
use super::research::research_topic;
use super::status::{StatusReporter, StepState};
use crate::campaign::{Campaign, SourceItem};
use crate::config::AppConfig;
use crate::error::LedgerError;
use crate::ledger::{normalize_topic, GeneratedPostRecord, KeyedLocks, Ledger};
use crate::metrics::MetricsCollector;
use crate::prompts::PromptError;
use crate::providers::{Capability, FallbackInvoker, InvokeError};
use crate::quality::{score_content, should_publish, ReviewDecision};

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The dedup ledger could not be read.
    #[error("Dedup check failed: {0}")]
    Dedup(#[source] LedgerError),

    /// A capability exhausted every handler.
    #[error("{stage} stage failed: {source}")]
    Invoke {
        stage: &'static str,
        #[source]
        source: InvokeError,
    },

    /// A prompt template failed to render.
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// The post could not be submitted.
    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    /// A stage tried to move the run backwards or out of a terminal state.
    #[error("Invalid run transition from '{from}' to '{to}'")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    /// A stage ran without the output of the stage before it.
    #[error("Missing state: {0}")]
    MissingState(&'static str),
}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The post was published. `flagged` runs published below the approve
    /// threshold.
    Published { context: RunContext, flagged: bool },
    /// The topic was already produced; nothing was generated.
    Skipped { context: RunContext, reason: String },
    /// The quality gate asked for a fresh attempt; nothing was published.
    RetryRequested { context: RunContext },
}

impl RunOutcome {
    pub fn context(&self) -> &RunContext {
        match self {
            RunOutcome::Published { context, .. }
            | RunOutcome::Skipped { context, .. }
            | RunOutcome::RetryRequested { context } => context,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Published { flagged: false, .. } => "published",
            RunOutcome::Published { flagged: true, .. } => "flagged",
            RunOutcome::Skipped { .. } => "skipped",
            RunOutcome::RetryRequested { .. } => "retry_requested",
        }
    }
}

/// A failed run with the context it reached.
#[derive(Debug, Error)]
#[error("Run for topic '{topic}' failed: {error}", topic = .context.source.topic)]
pub struct RunFailure {
    pub context: Box<RunContext>,
    #[source]
    pub error: PipelineError,
}

/// What `execute` finished with, before it is paired with the context.
enum Completion {
    Published { flagged: bool },
    Skipped { reason: String },
    RetryRequested,
}

/// Statistics about pipeline execution.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_runs: u64,
    pub published: u64,
    pub flagged: u64,
    pub skipped: u64,
    pub retry_requested: u64,
    pub failed: u64,
    pub average_duration: Duration,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, outcome: &str, duration: Duration) {
        self.total_runs += 1;
        match outcome {
            "published" => self.published += 1,
            "flagged" => {
                self.published += 1;
                self.flagged += 1;
            }
            "skipped" => self.skipped += 1,
            "retry_requested" => self.retry_requested += 1,
            _ => self.failed += 1,
        }
        self.update_average_duration(duration);
    }

    fn update_average_duration(&mut self, duration: Duration) {
        if self.total_runs == 1 {
            self.average_duration = duration;
        } else {
            // Incremental average: avg = avg + (new - avg) / n
            let n = self.total_runs as f64;
            let old_avg = self.average_duration.as_secs_f64();
            let new_avg = old_avg + (duration.as_secs_f64() - old_avg) / n;
            self.average_duration = Duration::from_secs_f64(new_avg.max(0.0));
        }
    }
}

/// Sequences work items through every stage.
pub struct ContentPipeline {
    invoker: Arc<FallbackInvoker>,
    acquirer: Arc<ImageAcquirer>,
    publisher: Arc<Publisher>,
    ledger: Arc<dyn Ledger>,
    enrichers: Vec<Arc<dyn Enricher>>,
    status: StatusReporter,
    locks: KeyedLocks,
    metrics: MetricsCollector,
    stats: Arc<tokio::sync::RwLock<PipelineStats>>,
    max_tokens: u32,
    max_concurrency: usize,
}

impl ContentPipeline {
    /// Creates a pipeline with the default enrichers (rewriting, internal
    /// links, structured data) and a tracing status sink.
    pub fn new(
        config: &AppConfig,
        invoker: Arc<FallbackInvoker>,
        acquirer: Arc<ImageAcquirer>,
        publisher: Arc<Publisher>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let enrichers: Vec<Arc<dyn Enricher>> = vec![
            Arc::new(Rewriter::new(
                Arc::clone(&invoker),
                config.generation_max_tokens,
            )),
            Arc::new(InternalLinker),
            Arc::new(SchemaInjector),
        ];

        Self {
            invoker,
            acquirer,
            publisher,
            ledger,
            enrichers,
            status: StatusReporter::default(),
            locks: KeyedLocks::new(),
            metrics: MetricsCollector::new(),
            stats: Arc::new(tokio::sync::RwLock::new(PipelineStats::new())),
            max_tokens: config.generation_max_tokens,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    pub fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = status;
        self
    }

    pub fn with_enrichers(mut self, enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        self.enrichers = enrichers;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Current statistics.
    pub async fn stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Runs one work item once.
    ///
    /// The per-topic key stays locked from the dedup check until the ledger
    /// write, so concurrent runs of the same topic cannot both publish.
    ///
    /// # Errors
    ///
    /// Returns `RunFailure` with the reached context when a fatal stage
    /// fails. A dedup skip is `Ok(RunOutcome::Skipped)`.
    pub async fn run(
        &self,
        campaign: &Campaign,
        source: SourceItem,
    ) -> Result<RunOutcome, RunFailure> {
        self.run_attempt(campaign, source, 1).await
    }

    /// Runs one work item, re-running it while the quality gate asks for a
    /// retry, up to `campaign.quality.max_retries` extra attempts.
    pub async fn run_with_retries(
        &self,
        campaign: &Campaign,
        source: SourceItem,
    ) -> Result<RunOutcome, RunFailure> {
        let max_attempts = campaign.quality.max_retries + 1;
        let mut attempt = 1;
        loop {
            let outcome = self.run_attempt(campaign, source.clone(), attempt).await?;
            match outcome {
                RunOutcome::RetryRequested { .. } if attempt < max_attempts => {
                    tracing::info!(
                        topic = %source.topic,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        "Quality gate requested a retry"
                    );
                    attempt += 1;
                }
                other => return Ok(other),
            }
        }
    }

    /// Runs many work items with bounded concurrency.
    ///
    /// Results are returned in input order.
    pub async fn run_batch(
        &self,
        campaign: &Campaign,
        items: Vec<SourceItem>,
    ) -> Vec<Result<RunOutcome, RunFailure>> {
        if items.is_empty() {
            return Vec::new();
        }

        let limiter = Arc::new(Semaphore::new(self.max_concurrency));
        let futures: Vec<_> = items
            .into_iter()
            .map(|item| {
                let limiter = Arc::clone(&limiter);
                async move {
                    let _permit = limiter.acquire_owned().await.ok();
                    self.run_with_retries(campaign, item).await
                }
            })
            .collect();

        futures::future::join_all(futures).await
    }

    async fn run_attempt(
        &self,
        campaign: &Campaign,
        source: SourceItem,
        attempt: u32,
    ) -> Result<RunOutcome, RunFailure> {
        let key = KeyedLocks::generated_key(&campaign.id, &campaign.target_site_id, &source.topic);
        let _guard = self.locks.acquire(&key).await;

        let started = Instant::now();
        let mut ctx = RunContext::new(&campaign.id, &campaign.target_site_id, source);
        ctx.attempt = attempt;
        let action_id = ctx.run_id.to_string();
        self.status
            .start(&action_id, &format!("Article: {}", ctx.topic()));

        self.metrics.inc_in_progress();
        let result = self.execute(campaign, &mut ctx, &action_id).await;
        self.metrics.dec_in_progress();

        let duration = started.elapsed();
        let outcome = match result {
            Ok(Completion::Published { flagged }) => RunOutcome::Published {
                context: ctx,
                flagged,
            },
            Ok(Completion::Skipped { reason }) => RunOutcome::Skipped {
                context: ctx,
                reason,
            },
            Ok(Completion::RetryRequested) => RunOutcome::RetryRequested { context: ctx },
            Err(error) => {
                let stage = ctx.status();
                if stage != RunStatus::Pending && !stage.is_terminal() {
                    self.status.step(&action_id, stage.as_str(), StepState::Failed);
                }
                if let Some(event) = ctx.fail(error.to_string()) {
                    self.status.transition(&event);
                }
                self.status.fail(&action_id, &error.to_string());
                tracing::error!(
                    run_id = %ctx.run_id,
                    topic = %ctx.topic(),
                    attempt = attempt,
                    error = %error,
                    "Run failed"
                );
                self.finish("failed", duration).await;
                return Err(RunFailure {
                    context: Box::new(ctx),
                    error,
                });
            }
        };

        let summary = match &outcome {
            RunOutcome::Published { context, .. } => context
                .publish
                .as_ref()
                .map(|p| format!("published {}", p.link))
                .unwrap_or_else(|| "published".to_string()),
            RunOutcome::Skipped { reason, .. } => format!("skipped: {}", reason),
            RunOutcome::RetryRequested { .. } => "retry requested".to_string(),
        };
        self.status.complete(&action_id, &summary);
        self.finish(outcome.as_str(), duration).await;
        Ok(outcome)
    }

    async fn finish(&self, outcome: &str, duration: Duration) {
        self.metrics.record_run(outcome, duration.as_secs_f64());
        self.stats.write().await.record(outcome, duration);
    }

    /// Moves the run forward and reports it.
    fn enter(
        &self,
        ctx: &mut RunContext,
        action_id: &str,
        next: RunStatus,
    ) -> Result<(), PipelineError> {
        let previous = ctx.status();
        let event = ctx.advance(next)?;
        self.status.transition(&event);
        if previous != RunStatus::Pending {
            self.status.step(action_id, previous.as_str(), StepState::Done);
        }
        if !next.is_terminal() {
            self.status.step(action_id, next.as_str(), StepState::Running);
        }
        self.status.progress(action_id, progress_for(next));
        Ok(())
    }

    fn skip(&self, action_id: &str, stage: RunStatus) {
        self.status.step(action_id, stage.as_str(), StepState::Skipped);
    }

    async fn execute(
        &self,
        campaign: &Campaign,
        ctx: &mut RunContext,
        action_id: &str,
    ) -> Result<Completion, PipelineError> {
        let decision = DedupGate::new(self.ledger.as_ref())
            .check(ctx.topic(), &campaign.id, &campaign.target_site_id)
            .await
            .map_err(PipelineError::Dedup)?;

        if let DedupDecision::Skip { reason } = decision {
            tracing::info!(run_id = %ctx.run_id, topic = %ctx.topic(), reason = %reason, "Skipping topic");
            if let Some(event) = ctx.fail(reason.clone()) {
                self.status.transition(&event);
            }
            return Ok(Completion::Skipped { reason });
        }

        ctx.matched_author = campaign
            .match_author(&ctx.source.topic, &ctx.source.keywords)
            .cloned();

        if campaign.stages.research {
            self.enter(ctx, action_id, RunStatus::Researching)?;
            match research_topic(&self.invoker, campaign, &ctx.source).await? {
                Some(notes) => ctx.research = Some(notes),
                None => ctx.warn("research skipped: no research handler registered"),
            }
        } else {
            self.skip(action_id, RunStatus::Researching);
        }

        self.enter(ctx, action_id, RunStatus::Generating)?;
        let content = generate_article(
            &self.invoker,
            campaign,
            &ctx.source,
            ctx.research.as_deref(),
            self.max_tokens,
        )
        .await?;
        if content.used_fallback_title {
            ctx.warn("no title heading in generated article, using the topic");
        }
        ctx.content = Some(content);

        if campaign.stages.images {
            self.enter(ctx, action_id, RunStatus::Imaging)?;
            let images = self
                .acquirer
                .acquire(
                    ctx.topic(),
                    &campaign.images,
                    campaign.providers.for_capability(Capability::GenerateImage),
                )
                .await;
            self.metrics.record_image_failures(images.failures.len());
            for failure in &images.failures {
                ctx.warn(format!("image slot {} unfilled: {}", failure.slot, failure.reason));
            }
            ctx.images = images;
        } else {
            self.skip(action_id, RunStatus::Imaging);
        }

        let enabled: Vec<&Arc<dyn Enricher>> = self
            .enrichers
            .iter()
            .filter(|e| e.enabled(campaign))
            .collect();
        if !enabled.is_empty() {
            self.enter(ctx, action_id, RunStatus::Linking)?;
            for enricher in enabled {
                if let Err(e) = enricher.enrich(campaign, ctx).await {
                    ctx.warn(format!("{} skipped: {}", enricher.name(), e));
                }
            }
        } else {
            self.skip(action_id, RunStatus::Linking);
        }

        self.enter(ctx, action_id, RunStatus::Scoring)?;
        let body = ctx
            .content
            .as_ref()
            .map(|c| c.body.as_str())
            .ok_or(PipelineError::MissingState("generated content"))?;
        let quality = score_content(body);
        let decision = if campaign.stages.quality_gate {
            campaign.quality.decide(quality.composite)
        } else {
            ReviewDecision::Approve
        };
        self.metrics.record_quality(f64::from(quality.composite));
        tracing::info!(
            run_id = %ctx.run_id,
            topic = %ctx.topic(),
            score = quality.composite,
            grade = %quality.grade,
            decision = %decision,
            "Content scored"
        );
        ctx.quality = Some(quality);
        ctx.decision = Some(decision);

        let gate = should_publish(ctx);
        if gate.should_retry || !gate.publish {
            self.enter(ctx, action_id, RunStatus::RetryRequested)?;
            return Ok(Completion::RetryRequested);
        }

        self.enter(ctx, action_id, RunStatus::Publishing)?;
        let result = self.publisher.publish(campaign, ctx).await?;
        for warning in &result.warnings {
            ctx.warn(warning.clone());
        }

        let record = GeneratedPostRecord {
            campaign_id: campaign.id.clone(),
            target_site_id: campaign.target_site_id.clone(),
            topic_key: normalize_topic(ctx.topic()),
            topic: ctx.topic().to_string(),
            post_id: result.post_id,
            link: result.link.clone(),
            quality_score: ctx.quality.as_ref().map(|q| q.composite),
            flagged: gate.flagged,
            created_at: Utc::now(),
        };
        ctx.publish = Some(result);

        // The post exists now; a ledger failure must not turn into a retry.
        match self.ledger.record_generated(&record).await {
            Ok(true) => {}
            Ok(false) => ctx.warn("ledger already had a record for this topic"),
            Err(e) => {
                tracing::error!(
                    run_id = %ctx.run_id,
                    topic = %ctx.topic(),
                    post_id = record.post_id,
                    error = %e,
                    "Published post could not be recorded in the ledger"
                );
                ctx.warn(format!("ledger write failed: {}", e));
            }
        }

        self.enter(ctx, action_id, RunStatus::Done)?;
        Ok(Completion::Published {
            flagged: gate.flagged,
        })
    }
}

fn progress_for(status: RunStatus) -> u8 {
    match status {
        RunStatus::Pending => 0,
        RunStatus::Researching => 10,
        RunStatus::Generating => 25,
        RunStatus::Imaging => 50,
        RunStatus::Linking => 65,
        RunStatus::Scoring => 75,
        RunStatus::Publishing => 90,
        RunStatus::Done | RunStatus::Failed | RunStatus::RetryRequested => 100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_stats() {
        let mut stats = PipelineStats::new();
        assert_eq!(stats.total_runs, 0);

        stats.record("published", Duration::from_secs(60));
        assert_eq!(stats.published, 1);
        assert_eq!(stats.average_duration.as_secs(), 60);

        stats.record("failed", Duration::from_secs(30));
        assert_eq!(stats.failed, 1);
        // Average should be (60 + 30) / 2 = 45
        assert_eq!(stats.average_duration.as_secs(), 45);

        stats.record("flagged", Duration::from_secs(45));
        assert_eq!(stats.published, 2);
        assert_eq!(stats.flagged, 1);

        stats.record("skipped", Duration::from_secs(45));
        stats.record("retry_requested", Duration::from_secs(45));
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.retry_requested, 1);
        assert_eq!(stats.total_runs, 5);
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::InvalidTransition {
            from: RunStatus::Scoring,
            to: RunStatus::Generating,
        };
        assert_eq!(
            err.to_string(),
            "Invalid run transition from 'scoring' to 'generating'"
        );

        let err = PipelineError::Invoke {
            stage: "generate",
            source: InvokeError::NoHandlers {
                capability: Capability::GenerateText,
            },
        };
        assert!(err.to_string().starts_with("generate stage failed"));
        assert!(err.to_string().contains("generate"));
    }

    #[test]
    fn test_progress_is_monotonic() {
        let order = [
            RunStatus::Pending,
            RunStatus::Researching,
            RunStatus::Generating,
            RunStatus::Imaging,
            RunStatus::Linking,
            RunStatus::Scoring,
            RunStatus::Publishing,
            RunStatus::Done,
        ];
        assert!(order
            .windows(2)
            .all(|w| progress_for(w[0]) < progress_for(w[1])));
    }
}

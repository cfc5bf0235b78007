//! Translation job runner.
//!
//! A job expands into (source post, target) work items. Each item is checked
//! against the translation history, translated, post-processed and published
//! to the target site, then appended to the history. The per-triple lock is
//! held from the history check to the append.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::sync::Semaphore;

use super::postprocess::{apply, TranslatedPost};
use super::types::{
    TranslationError, TranslationItemReport, TranslationJob, TranslationOutcome, TranslationRecord,
    TranslationReport, TranslationStatus, TranslationTarget,
};
use crate::hosting::{ArticleHost, PostDraft, PostRef, PublishedPost};
use crate::ledger::{is_already_translated, KeyedLocks, Ledger};
use crate::metrics::MetricsCollector;
use crate::pipeline::slugify;
use crate::prompts::build_translation_prompt;
use crate::providers::{Capability, FallbackInvoker, InvokePayload};
use crate::utils::html::strip_tags;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n(.*?)\n?```\s*$").expect("valid regex")
});

static TITLE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^[ \t]*TITLE:[ \t]*(.*)$").expect("valid regex"));

static EXCERPT_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^[ \t]*EXCERPT:[ \t]*(.*)$").expect("valid regex"));

static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*---[ \t]*$").expect("valid regex"));

/// Splits translated output into title, excerpt and body.
///
/// The header is everything before the first `---` line that follows a
/// `TITLE:` or `EXCERPT:` line. Output without such a header is taken as a
/// bare body, so a horizontal rule in the body is kept, and the original
/// title and excerpt are kept.
pub fn parse_translation(raw: &str, original: &PublishedPost) -> TranslatedPost {
    let text = match FENCE_RE.captures(raw) {
        Some(caps) => caps[1].to_string(),
        None => raw.to_string(),
    };

    let separator = SEPARATOR_RE.find_iter(&text).find(|sep| {
        let header = &text[..sep.start()];
        TITLE_LINE_RE.is_match(header) || EXCERPT_LINE_RE.is_match(header)
    });
    let Some(separator) = separator else {
        return TranslatedPost {
            title: strip_tags(&original.title),
            excerpt: strip_tags(&original.excerpt),
            content: text.trim().to_string(),
            slug: original.slug.clone(),
        };
    };

    let header = &text[..separator.start()];
    let body = text[separator.end()..].trim();

    let title = TITLE_LINE_RE
        .captures(header)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| strip_tags(&original.title));
    let excerpt = EXCERPT_LINE_RE
        .captures(header)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| strip_tags(&original.excerpt));

    TranslatedPost {
        slug: original.slug.clone(),
        title,
        excerpt,
        content: body.to_string(),
    }
}

/// Runs translation jobs.
pub struct TranslationPipeline {
    invoker: Arc<FallbackInvoker>,
    host: Arc<dyn ArticleHost>,
    ledger: Arc<dyn Ledger>,
    locks: KeyedLocks,
    metrics: MetricsCollector,
    max_tokens: u32,
}

impl TranslationPipeline {
    pub fn new(
        invoker: Arc<FallbackInvoker>,
        host: Arc<dyn ArticleHost>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            invoker,
            host,
            ledger,
            locks: KeyedLocks::new(),
            metrics: MetricsCollector::new(),
            max_tokens: 8192,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Fetches the job's source posts and translates each into every target.
    ///
    /// # Errors
    ///
    /// Returns an error only when the source posts cannot be listed.
    /// Per-item failures are reported in the returned `TranslationReport`.
    pub async fn run_job(&self, job: &TranslationJob) -> Result<TranslationReport, TranslationError> {
        let posts = self
            .host
            .get_posts(&job.source_site_id, &job.source_filters)
            .await?;

        tracing::info!(
            job_id = %job.id,
            source_site = %job.source_site_id,
            posts = posts.len(),
            targets = job.targets.len(),
            "Starting translation job"
        );

        let limiter = Arc::new(Semaphore::new(job.concurrency.max(1)));
        let futures: Vec<_> = posts
            .iter()
            .flat_map(|post| job.targets.iter().map(move |target| (post, target)))
            .map(|(post, target)| {
                let limiter = Arc::clone(&limiter);
                async move {
                    let _permit = limiter.acquire_owned().await.ok();
                    self.translate_one(job, post, target).await
                }
            })
            .collect();

        let mut report = TranslationReport::new(&job.id);
        for item in futures::future::join_all(futures).await {
            report.push(item);
        }

        tracing::info!(
            job_id = %job.id,
            published = report.published,
            skipped = report.skipped,
            failed = report.failed,
            "Translation job finished"
        );
        Ok(report)
    }

    /// Translates one post into one target.
    pub async fn translate_one(
        &self,
        job: &TranslationJob,
        post: &PublishedPost,
        target: &TranslationTarget,
    ) -> TranslationItemReport {
        let key = KeyedLocks::translation_key(post.id, &target.language, &target.site_id);
        let _guard = self.locks.acquire(&key).await;

        let report = |outcome: TranslationOutcome| TranslationItemReport {
            source_post_id: post.id,
            target_language: target.language.clone(),
            target_site_id: target.site_id.clone(),
            outcome,
        };

        let history = match self
            .ledger
            .translation_history(&job.source_site_id, post.id)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                self.metrics.record_translation("failed");
                return report(TranslationOutcome::Failed {
                    stage: TranslationStatus::Pending,
                    error: e.to_string(),
                });
            }
        };

        if is_already_translated(&history, post.id, &target.language, &target.site_id) {
            let reason = format!(
                "post {} already translated to '{}' on site '{}'",
                post.id, target.language, target.site_id
            );
            tracing::info!(job_id = %job.id, post_id = post.id, language = %target.language, "Skipping translation");
            self.metrics.record_translation("skipped");
            return report(TranslationOutcome::Skipped { reason });
        }

        let mut record = TranslationRecord::new(
            &job.id,
            post.id,
            &job.source_site_id,
            &target.language,
            &target.site_id,
        );
        record.source_chars = post.content.chars().count();

        let outcome = match self.attempt(job, post, target, &mut record).await {
            Ok(created) => {
                record.target_post_id = Some(created.id);
                record.target_link = Some(created.link.clone());
                tracing::info!(
                    job_id = %job.id,
                    post_id = post.id,
                    language = %target.language,
                    target_post_id = created.id,
                    "Translation published"
                );
                TranslationOutcome::Published {
                    post_id: created.id,
                    link: created.link,
                }
            }
            Err(e) => {
                record.fail(e.to_string());
                tracing::error!(
                    job_id = %job.id,
                    post_id = post.id,
                    language = %target.language,
                    error = %e,
                    "Translation failed"
                );
                TranslationOutcome::Failed {
                    stage: record.failed_stage.unwrap_or(TranslationStatus::Pending),
                    error: e.to_string(),
                }
            }
        };

        if let Err(e) = self.ledger.append_translation(&record).await {
            tracing::error!(
                job_id = %job.id,
                post_id = post.id,
                language = %target.language,
                error = %e,
                "Translation record could not be appended"
            );
        }

        self.metrics.record_translation(record.status.as_str());
        report(outcome)
    }

    async fn attempt(
        &self,
        job: &TranslationJob,
        post: &PublishedPost,
        target: &TranslationTarget,
        record: &mut TranslationRecord,
    ) -> Result<PostRef, TranslationError> {
        record.advance(TranslationStatus::Translating)?;
        let source_language = job
            .source_language
            .as_deref()
            .unwrap_or("the original language");
        let prompt = build_translation_prompt(
            &strip_tags(&post.title),
            &strip_tags(&post.excerpt),
            &post.content,
            source_language,
            &target.language,
        )?;
        let payload = InvokePayload::new(prompt.user)
            .with_system(prompt.system)
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.3);
        let outcome = self
            .invoker
            .invoke(Capability::GenerateText, &payload, &job.providers)
            .await?;

        record.advance(TranslationStatus::Processing)?;
        let mut translated = parse_translation(&outcome.text, post);
        if translated.slug.is_empty() {
            translated.slug = slugify(&translated.title);
        }
        let source_title = strip_tags(&post.title);
        record.applied_postprocess = apply(
            &mut translated,
            &job.postprocess,
            job,
            target,
            (&post.link, &source_title),
        );

        record.advance(TranslationStatus::Publishing)?;
        let draft = PostDraft {
            title: translated.title,
            content: translated.content,
            excerpt: translated.excerpt,
            slug: translated.slug,
            status: target.post_status,
            categories: target.categories.clone(),
            author: None,
            featured_media: post.featured_media,
        };
        let created = self.host.create_post(&target.site_id, &draft).await?;

        record.advance(TranslationStatus::Published)?;
        Ok(created)
    }
}

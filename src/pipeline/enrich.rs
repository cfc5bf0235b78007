//! Enrichment side-pipelines.
//!
//! Each [`Enricher`] rewrites the generated content in place. Failures are
//! degraded: the orchestrator logs them as warnings and moves on.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};
use thiserror::Error;

use super::context::RunContext;
use crate::campaign::Campaign;
use crate::prompts::{build_rewrite_prompt, PromptError};
use crate::providers::{Capability, FallbackInvoker, InvokeError, InvokePayload};
use crate::utils::html::{escape, strip_tags, word_count};

/// Errors raised by an enricher.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("No generated content to enrich")]
    NoContent,

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Invocation failed: {0}")]
    Invoke(#[from] InvokeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rejected output: {0}")]
    Rejected(String),
}

/// A content side-pipeline.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the campaign turns this enricher on.
    fn enabled(&self, campaign: &Campaign) -> bool;

    async fn enrich(&self, campaign: &Campaign, ctx: &mut RunContext) -> Result<(), EnrichError>;
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static TAG_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9]*)").expect("valid regex"));

static H2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").expect("valid regex"));

static H3_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h3[^>]*>(.*?)</h3>").expect("valid regex"));

/// Turns the first plain-text mention of each keyword into an internal link.
#[derive(Debug, Default, Clone)]
pub struct InternalLinker;

impl InternalLinker {
    /// Links the first eligible occurrence of `keyword` in `body`.
    ///
    /// Text inside tags, existing anchors and headings is never linked.
    pub fn link_first(body: &str, keyword: &str, url: &str) -> Option<String> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return None;
        }
        let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword))).ok()?;

        let mut protected_depth = 0usize;
        let mut cursor = 0usize;

        let mut segments: Vec<(usize, usize, bool)> = Vec::new();
        for tag in TAG_RE.find_iter(body) {
            segments.push((cursor, tag.start(), protected_depth == 0));
            if let Some(caps) = TAG_NAME_RE.captures(tag.as_str()) {
                let closing = !caps[1].is_empty();
                let name = caps[2].to_ascii_lowercase();
                if is_protected(&name) {
                    if closing {
                        protected_depth = protected_depth.saturating_sub(1);
                    } else {
                        protected_depth += 1;
                    }
                }
            }
            cursor = tag.end();
        }
        segments.push((cursor, body.len(), protected_depth == 0));

        for (start, end, eligible) in segments {
            if !eligible || start >= end {
                continue;
            }
            if let Some(found) = pattern.find(&body[start..end]) {
                let (a, b) = (start + found.start(), start + found.end());
                return Some(format!(
                    "{}<a href=\"{}\">{}</a>{}",
                    &body[..a],
                    escape(url),
                    &body[a..b],
                    &body[b..]
                ));
            }
        }
        None
    }
}

fn is_protected(tag: &str) -> bool {
    matches!(
        tag,
        "a" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "script" | "code" | "pre"
    )
}

#[async_trait]
impl Enricher for InternalLinker {
    fn name(&self) -> &'static str {
        "internal_links"
    }

    fn enabled(&self, campaign: &Campaign) -> bool {
        campaign.stages.seo_linking && !campaign.internal_links.is_empty()
    }

    async fn enrich(&self, campaign: &Campaign, ctx: &mut RunContext) -> Result<(), EnrichError> {
        let content = ctx.content.as_mut().ok_or(EnrichError::NoContent)?;
        let mut inserted = 0usize;

        for link in &campaign.internal_links {
            if inserted >= campaign.max_internal_links {
                break;
            }
            if content.body.contains(&format!("href=\"{}\"", link.url)) {
                continue;
            }
            for keyword in &link.keywords {
                if let Some(linked) = Self::link_first(&content.body, keyword, &link.url) {
                    content.body = linked;
                    inserted += 1;
                    break;
                }
            }
        }

        tracing::debug!(topic = %ctx.source.topic, links = inserted, "Internal links injected");
        Ok(())
    }
}

/// Appends JSON-LD structured data: an `Article` and, when the body has an
/// FAQ section, a `FAQPage`.
#[derive(Debug, Default, Clone)]
pub struct SchemaInjector;

impl SchemaInjector {
    /// Question and answer pairs from the FAQ section, if any.
    pub fn faq_pairs(body: &str) -> Vec<(String, String)> {
        let Some(section_start) = H2_RE.captures_iter(body).find_map(|caps| {
            let heading = strip_tags(&caps[1]).to_lowercase();
            let whole = caps.get(0)?;
            (heading.contains("faq") || heading.contains("frequently asked"))
                .then_some(whole.end())
        }) else {
            return Vec::new();
        };

        let rest = &body[section_start..];
        let section = match H2_RE.find(rest) {
            Some(next) => &rest[..next.start()],
            None => rest,
        };

        let questions: Vec<_> = H3_RE.captures_iter(section).collect();
        let mut pairs = Vec::with_capacity(questions.len());
        for (i, caps) in questions.iter().enumerate() {
            let Some(whole) = caps.get(0) else { continue };
            let answer_end = questions
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(section.len(), |m| m.start());
            let question = strip_tags(&caps[1]);
            let answer = strip_tags(&section[whole.end()..answer_end]);
            if !question.is_empty() && !answer.is_empty() {
                pairs.push((question, answer));
            }
        }
        pairs
    }

    /// Builds the JSON-LD documents for an article.
    pub fn documents(
        title: &str,
        excerpt: &str,
        author: Option<&str>,
        body: &str,
    ) -> Vec<Value> {
        let mut article = json!({
            "@context": "https://schema.org",
            "@type": "Article",
            "headline": title,
            "description": excerpt,
            "datePublished": Utc::now().to_rfc3339(),
            "wordCount": word_count(&strip_tags(body)),
        });
        if let Some(name) = author {
            article["author"] = json!({ "@type": "Person", "name": name });
        }

        let mut docs = vec![article];

        let faq = Self::faq_pairs(body);
        if !faq.is_empty() {
            let entities: Vec<Value> = faq
                .into_iter()
                .map(|(question, answer)| {
                    json!({
                        "@type": "Question",
                        "name": question,
                        "acceptedAnswer": { "@type": "Answer", "text": answer },
                    })
                })
                .collect();
            docs.push(json!({
                "@context": "https://schema.org",
                "@type": "FAQPage",
                "mainEntity": entities,
            }));
        }
        docs
    }
}

#[async_trait]
impl Enricher for SchemaInjector {
    fn name(&self) -> &'static str {
        "structured_data"
    }

    fn enabled(&self, campaign: &Campaign) -> bool {
        campaign.stages.structured_data
    }

    async fn enrich(&self, _campaign: &Campaign, ctx: &mut RunContext) -> Result<(), EnrichError> {
        let author = ctx.matched_author.as_ref().map(|a| a.name.clone());
        let content = ctx.content.as_mut().ok_or(EnrichError::NoContent)?;
        if content.body.contains("application/ld+json") {
            return Ok(());
        }

        let docs = Self::documents(&content.title, &content.excerpt, author.as_deref(), &content.body);
        for doc in &docs {
            // Keep a literal "</script>" in the data from closing the tag early.
            let encoded = serde_json::to_string(doc)?.replace("</", "<\\/");
            content.body.push_str(&format!(
                "\n<script type=\"application/ld+json\">{}</script>",
                encoded
            ));
        }
        Ok(())
    }
}

/// Rewrites the body through the text capability for a more natural voice.
pub struct Rewriter {
    invoker: Arc<FallbackInvoker>,
    max_tokens: u32,
}

impl Rewriter {
    /// Minimum share of the original word count a rewrite must keep.
    const MIN_LENGTH_RATIO: f64 = 0.6;

    pub fn new(invoker: Arc<FallbackInvoker>, max_tokens: u32) -> Self {
        Self {
            invoker,
            max_tokens,
        }
    }
}

#[async_trait]
impl Enricher for Rewriter {
    fn name(&self) -> &'static str {
        "rewriting"
    }

    fn enabled(&self, campaign: &Campaign) -> bool {
        campaign.stages.rewriting
    }

    async fn enrich(&self, campaign: &Campaign, ctx: &mut RunContext) -> Result<(), EnrichError> {
        let content = ctx.content.as_mut().ok_or(EnrichError::NoContent)?;

        let prompt = build_rewrite_prompt(&content.body, &campaign.tone)?;
        let payload = InvokePayload::new(prompt.user)
            .with_system(prompt.system)
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.8);

        let outcome = self
            .invoker
            .invoke(
                Capability::GenerateText,
                &payload,
                campaign.providers.for_capability(Capability::GenerateText),
            )
            .await?;

        let before = word_count(&strip_tags(&content.body));
        let rewritten = outcome.text.trim();
        let after = word_count(&strip_tags(rewritten));
        if (after as f64) < before as f64 * Self::MIN_LENGTH_RATIO {
            return Err(EnrichError::Rejected(format!(
                "rewrite kept {} of {} words",
                after, before
            )));
        }

        content.body = rewritten.to_string();
        Ok(())
    }
}

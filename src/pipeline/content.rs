//! Content generation stage and article parsing.

use regex::Regex;
use std::sync::LazyLock;

use super::context::GeneratedContent;
use super::orchestrator::PipelineError;
use crate::campaign::{Campaign, SourceItem};
use crate::prompts::build_article_prompt;
use crate::providers::{Capability, FallbackInvoker, HandlerKind, InvokePayload};
use crate::utils::html::{strip_tags, truncate_chars};

/// Maximum slug length in characters.
pub const MAX_SLUG_CHARS: usize = 80;

/// Maximum excerpt length in characters, including the ellipsis.
pub const MAX_EXCERPT_CHARS: usize = 160;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n(.*?)\n?```\s*$").expect("valid regex")
});

static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid regex"));

static MD_H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*#*[ \t]*$").expect("valid regex"));

static EXCERPT_P_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<p[^>]*class\s*=\s*["'][^"']*\bexcerpt\b[^"']*["'][^>]*>(.*?)</p>"#)
        .expect("valid regex")
});

static EXCERPT_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^[ \t]*excerpt:[ \t]*(.+)$").expect("valid regex"));

static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("valid regex"));

/// Turns a title into a URL slug.
///
/// Lower-cases, collapses every non-alphanumeric run into one hyphen, trims
/// hyphens and caps the result at [`MAX_SLUG_CHARS`] on a hyphen boundary.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.chars().count() <= MAX_SLUG_CHARS {
        return slug;
    }

    let capped: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    let next_is_boundary = slug.chars().nth(MAX_SLUG_CHARS) == Some('-');
    if next_is_boundary {
        return capped;
    }
    match capped.rfind('-') {
        Some(idx) if idx > 0 => capped[..idx].to_string(),
        _ => capped,
    }
}

/// Parses raw model output into title, body, excerpt and slug.
///
/// A missing heading is not an error: the topic becomes the title and
/// `used_fallback_title` is set.
pub fn parse_article(raw: &str, topic: &str, handler: HandlerKind) -> GeneratedContent {
    let mut body = match FENCE_RE.captures(raw) {
        Some(caps) => caps[1].to_string(),
        None => raw.to_string(),
    };

    let heading = H1_RE
        .captures(&body)
        .or_else(|| MD_H1_RE.captures(&body))
        .and_then(|caps| {
            let span = caps.get(0)?.range();
            let text = strip_tags(&caps[1]);
            (!text.is_empty()).then_some((span, text))
        });

    let (title, used_fallback_title) = match heading {
        Some((span, text)) => {
            body.replace_range(span, "");
            (text, false)
        }
        None => (topic.trim().to_string(), true),
    };

    let explicit_excerpt = EXCERPT_P_RE
        .captures(&body)
        .or_else(|| EXCERPT_LINE_RE.captures(&body))
        .and_then(|caps| Some((caps.get(0)?.range(), strip_tags(&caps[1]))));

    let excerpt_text = match explicit_excerpt {
        Some((span, text)) => {
            body.replace_range(span, "");
            text
        }
        None => first_paragraph(&body),
    };

    let body = body.trim().to_string();

    GeneratedContent {
        slug: slugify(&title),
        title,
        excerpt: truncate_chars(&excerpt_text, MAX_EXCERPT_CHARS),
        body,
        used_fallback_title,
        handler_used: handler,
    }
}

/// Text of the first `<p>`, or of the first non-heading text block.
fn first_paragraph(body: &str) -> String {
    if let Some(caps) = PARAGRAPH_RE.captures(body) {
        let text = strip_tags(&caps[1]);
        if !text.is_empty() {
            return text;
        }
    }

    body.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty() && !block.starts_with('#') && !block.starts_with("<h"))
        .map(strip_tags)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// Renders the prompt, invokes text generation and parses the article.
///
/// `max_tokens` is passed through untouched; output is never truncated.
pub async fn generate_article(
    invoker: &FallbackInvoker,
    campaign: &Campaign,
    source: &SourceItem,
    research: Option<&str>,
    max_tokens: u32,
) -> Result<GeneratedContent, PipelineError> {
    let prompt = build_article_prompt(campaign, source, research)?;
    let payload = InvokePayload::new(prompt.user)
        .with_system(prompt.system)
        .with_max_tokens(max_tokens)
        .with_temperature(0.7);

    let outcome = invoker
        .invoke(
            Capability::GenerateText,
            &payload,
            campaign.providers.for_capability(Capability::GenerateText),
        )
        .await
        .map_err(|source| PipelineError::Invoke {
            stage: "generate",
            source,
        })?;

    let content = parse_article(&outcome.text, &source.topic, outcome.handler_used);
    tracing::info!(
        topic = %source.topic,
        handler = %outcome.handler_used,
        latency_ms = outcome.latency_ms,
        fallbacks = outcome.failed_attempts.len(),
        title = %content.title,
        fallback_title = content.used_fallback_title,
        "Article generated"
    );
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Top 10 Budget Tips!"), "top-10-budget-tips");
        assert_eq!(slugify("  --Hello,   World--  "), "hello-world");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_caps_on_hyphen_boundary() {
        let title = "word ".repeat(30);
        let slug = slugify(&title);
        assert!(slug.chars().count() <= MAX_SLUG_CHARS);
        assert!(slug.ends_with("word"));
        assert!(!slug.ends_with('-'));

        let long_word = "a".repeat(100);
        assert_eq!(slugify(&long_word).len(), MAX_SLUG_CHARS);
    }

    #[test]
    fn test_parse_html_article() {
        let raw = r#"<h1>Saving on <em>Groceries</em></h1>
<p class="excerpt">Practical ways to cut your food bill.</p>
<p>I cut my grocery spend by 30% last year.</p>
<h2>Plan meals</h2>"#;

        let content = parse_article(raw, "groceries", HandlerKind::Anthropic);
        assert_eq!(content.title, "Saving on Groceries");
        assert_eq!(content.slug, "saving-on-groceries");
        assert_eq!(content.excerpt, "Practical ways to cut your food bill.");
        assert!(!content.used_fallback_title);
        assert!(!content.body.contains("<h1>"));
        assert!(!content.body.contains("excerpt"));
        assert!(content.body.starts_with("<p>I cut"));
        assert_eq!(content.handler_used, HandlerKind::Anthropic);
    }

    #[test]
    fn test_parse_markdown_article_with_excerpt_line() {
        let raw = "```markdown\n# Budget Travel Hacks\nExcerpt: Travel more for less.\n\nFirst paragraph.\n```";
        let content = parse_article(raw, "travel", HandlerKind::OpenAi);
        assert_eq!(content.title, "Budget Travel Hacks");
        assert_eq!(content.excerpt, "Travel more for less.");
        assert_eq!(content.body, "First paragraph.");
    }

    #[test]
    fn test_missing_heading_falls_back_to_topic() {
        let raw = "<p>Just a body without a title.</p>";
        let content = parse_article(raw, "Home Office Setup", HandlerKind::Gemini);
        assert!(content.used_fallback_title);
        assert_eq!(content.title, "Home Office Setup");
        assert_eq!(content.slug, "home-office-setup");
        assert_eq!(content.excerpt, "Just a body without a title.");
    }

    #[test]
    fn test_excerpt_from_first_paragraph_is_truncated() {
        let long = "word ".repeat(60);
        let raw = format!("<h1>T</h1><p>{}</p>", long);
        let content = parse_article(&raw, "t", HandlerKind::OpenAi);
        assert!(content.excerpt.chars().count() <= MAX_EXCERPT_CHARS);
        assert!(content.excerpt.ends_with('…'));
    }
}

//! Article generation prompts.

use tera::Context;

use super::{render, PromptError};
use crate::campaign::{Campaign, SourceItem};

/// System and user messages for article generation.
#[derive(Debug, Clone)]
pub struct ArticlePrompt {
    pub system: String,
    pub user: String,
}

impl ArticlePrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

const ARTICLE_SYSTEM_PROMPT: &str = r#"You are a senior editor writing original, well-sourced web articles.

## WRITING RULES

- Write from first-hand experience where it is plausible, and say so.
- Attribute statistics and claims to named sources.
- Use clear HTML: one <h1> title, <h2> section headings, <p>, <ul>/<ol>.
- Never pad the text. Every section must add information.

## OUTPUT FORMAT

1. An <h1> with the article title.
2. A <p class="excerpt"> with a one or two sentence summary.
3. The article body in HTML.

Output ONLY the HTML. No markdown fences and no commentary."#;

const ARTICLE_USER_TEMPLATE: &str = r#"Write {{ article_kind }} about "{{ topic }}".

Tone: {{ tone }}
Target length: about {{ word_count }} words
{% if keywords %}Keywords to cover naturally: {{ keywords | join(sep=", ") }}
{% endif %}{% if include_toc %}Start the body with a table of contents linking to each <h2> section.
{% endif %}{% if include_faq %}End with an <h2>Frequently Asked Questions</h2> section of 3 to 5 question and answer pairs, each question in an <h3>.
{% endif %}{% if research %}
## RESEARCH NOTES

Ground facts and figures in these notes and credit their sources:

{{ research }}
{% endif %}"#;

/// Builds the generation prompt for one topic.
///
/// Research text, when present, is appended as grounding context.
pub fn build_article_prompt(
    campaign: &Campaign,
    source: &SourceItem,
    research: Option<&str>,
) -> Result<ArticlePrompt, PromptError> {
    let mut context = Context::new();
    context.insert("article_kind", campaign.article_type.describe());
    context.insert("topic", &source.topic);
    context.insert("tone", &campaign.tone);
    context.insert("word_count", &campaign.target_word_count);
    context.insert("keywords", &source.keywords);
    context.insert("include_toc", &campaign.include_toc);
    context.insert("include_faq", &campaign.include_faq);
    context.insert("research", &research.unwrap_or_default());

    let user = render("article", ARTICLE_USER_TEMPLATE, &context)?;
    Ok(ArticlePrompt::new(ARTICLE_SYSTEM_PROMPT, user))
}

const REWRITE_SYSTEM_PROMPT: &str = r#"You are a copy editor. Rewrite the article you are given so it reads naturally and varies sentence rhythm, keeping every fact, link, heading and HTML tag intact. Output ONLY the rewritten HTML."#;

const REWRITE_USER_TEMPLATE: &str = r#"Rewrite this article in a {{ tone }} tone.

{{ body }}"#;

/// Builds the prompt for the rewriting side-pipeline.
pub fn build_rewrite_prompt(body: &str, tone: &str) -> Result<ArticlePrompt, PromptError> {
    let mut context = Context::new();
    context.insert("body", body);
    context.insert("tone", tone);

    let user = render("rewrite", REWRITE_USER_TEMPLATE, &context)?;
    Ok(ArticlePrompt::new(REWRITE_SYSTEM_PROMPT, user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::ArticleType;

    #[test]
    fn test_article_prompt_includes_options() {
        let mut campaign = Campaign::new("c1", "s1");
        campaign.article_type = ArticleType::HowTo;
        campaign.include_faq = true;
        campaign.tone = "friendly".to_string();
        let source = SourceItem::new("Budget travel")
            .with_keywords(vec!["hostels".to_string(), "rail passes".to_string()]);

        let prompt = build_article_prompt(&campaign, &source, Some("Hostel prices rose 8% (Hostelworld)."))
            .expect("render");

        assert!(prompt.user.contains("step-by-step how-to"));
        assert!(prompt.user.contains("\"Budget travel\""));
        assert!(prompt.user.contains("Tone: friendly"));
        assert!(prompt.user.contains("hostels, rail passes"));
        assert!(prompt.user.contains("Frequently Asked Questions"));
        assert!(!prompt.user.contains("table of contents"));
        assert!(prompt.user.contains("Hostelworld"));
        assert!(prompt.system.contains("<h1>"));
    }

    #[test]
    fn test_article_prompt_without_research() {
        let campaign = Campaign::new("c1", "s1");
        let prompt = build_article_prompt(&campaign, &SourceItem::new("Topic"), None)
            .expect("render");
        assert!(!prompt.user.contains("RESEARCH NOTES"));
        assert!(!prompt.user.contains("Keywords"));
    }

    #[test]
    fn test_rewrite_prompt() {
        let prompt = build_rewrite_prompt("<p>Body</p>", "casual").expect("render");
        assert!(prompt.user.contains("casual tone"));
        assert!(prompt.user.ends_with("<p>Body</p>"));
    }
}

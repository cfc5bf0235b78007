//! Research brief and image description prompts.

use tera::Context;

use super::{render, PromptError};
use crate::pipeline::ImageSlot;

/// System and user messages for the research capability.
#[derive(Debug, Clone)]
pub struct ResearchPrompt {
    pub system: String,
    pub user: String,
}

const RESEARCH_SYSTEM_PROMPT: &str = r#"You are a research assistant preparing a fact sheet for a writer.

Return concise bullet points: current statistics with their source and year, expert opinions with attribution, common misconceptions, and practical tips. Prefer primary sources. Do not write the article."#;

const RESEARCH_USER_TEMPLATE: &str = r#"Research the topic "{{ topic }}".
{% if keywords %}Focus areas: {{ keywords | join(sep=", ") }}
{% endif %}{% if source_url %}Start from this source: {{ source_url }}
{% endif %}"#;

/// Builds the research prompt for a topic.
pub fn build_research_prompt(
    topic: &str,
    keywords: &[String],
    source_url: Option<&str>,
) -> Result<ResearchPrompt, PromptError> {
    let mut context = Context::new();
    context.insert("topic", topic);
    context.insert("keywords", keywords);
    context.insert("source_url", &source_url.unwrap_or_default());

    Ok(ResearchPrompt {
        system: RESEARCH_SYSTEM_PROMPT.to_string(),
        user: render("research", RESEARCH_USER_TEMPLATE, &context)?,
    })
}

const IMAGE_TEMPLATE: &str = r#"{% if cover %}A wide editorial cover photograph{% else %}An editorial illustration{% endif %} for an article titled "{{ topic }}". {{ focus }} Natural light, no text, no watermarks, no logos."#;

/// Describes the image wanted for a slot.
pub fn build_image_prompt(topic: &str, slot: ImageSlot) -> Result<String, PromptError> {
    let focus = match slot {
        ImageSlot::Cover => "Capture the overall subject.".to_string(),
        ImageSlot::Inline { index, .. } => {
            format!("Show a specific detail or scene, variation {}.", index)
        }
    };

    let mut context = Context::new();
    context.insert("cover", &matches!(slot, ImageSlot::Cover));
    context.insert("topic", topic);
    context.insert("focus", &focus);
    render("image", IMAGE_TEMPLATE, &context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Placement;

    #[test]
    fn test_research_prompt() {
        let prompt = build_research_prompt(
            "Solar panels",
            &["costs".to_string()],
            Some("https://example.com/solar"),
        )
        .expect("render");
        assert!(prompt.user.contains("\"Solar panels\""));
        assert!(prompt.user.contains("Focus areas: costs"));
        assert!(prompt.user.contains("https://example.com/solar"));
    }

    #[test]
    fn test_image_prompt_varies_by_slot() {
        let cover = build_image_prompt("Tiny homes", ImageSlot::Cover).expect("render");
        let inline = build_image_prompt(
            "Tiny homes",
            ImageSlot::Inline {
                index: 2,
                placement: Placement::AfterH2,
            },
        )
        .expect("render");

        assert!(cover.starts_with("A wide editorial cover"));
        assert!(inline.contains("variation 2"));
        assert_ne!(cover, inline);
    }
}

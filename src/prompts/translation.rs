//! Post translation prompt.

use tera::Context;

use super::{render, PromptError};

/// System and user messages for translating a post.
#[derive(Debug, Clone)]
pub struct TranslationPrompt {
    pub system: String,
    pub user: String,
}

const TRANSLATION_SYSTEM_PROMPT: &str = r#"You are a professional translator for web publications.

Translate the article faithfully, adapting idioms and units for the target audience. Keep every HTML tag, attribute and URL exactly as given.

## OUTPUT FORMAT

TITLE: <translated title>
EXCERPT: <translated excerpt>
---
<translated HTML body>"#;

const TRANSLATION_USER_TEMPLATE: &str = r#"Translate from {{ source_language }} to {{ target_language }}.

TITLE: {{ title }}
EXCERPT: {{ excerpt }}
---
{{ content }}"#;

pub fn build_translation_prompt(
    title: &str,
    excerpt: &str,
    content: &str,
    source_language: &str,
    target_language: &str,
) -> Result<TranslationPrompt, PromptError> {
    let mut context = Context::new();
    context.insert("title", title);
    context.insert("excerpt", excerpt);
    context.insert("content", content);
    context.insert("source_language", source_language);
    context.insert("target_language", target_language);

    Ok(TranslationPrompt {
        system: TRANSLATION_SYSTEM_PROMPT.to_string(),
        user: render("translation", TRANSLATION_USER_TEMPLATE, &context)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_prompt_layout() {
        let prompt =
            build_translation_prompt("Hello", "Short", "<p>World</p>", "en", "es").expect("render");
        assert!(prompt.user.starts_with("Translate from en to es."));
        assert!(prompt.user.contains("TITLE: Hello\nEXCERPT: Short\n---\n<p>World</p>"));
    }
}

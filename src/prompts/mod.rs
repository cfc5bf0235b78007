//! Prompt templates for every model-facing stage.
//!
//! Templates are tera strings rendered with [`tera::Tera::one_off`]; each
//! builder returns a `{system, user}` pair.
//!
//! - [`article`] - article generation and rewriting
//! - [`research`] - research briefs and image descriptions
//! - [`translation`] - post translation

pub mod article;
pub mod research;
pub mod translation;

pub use article::{build_article_prompt, build_rewrite_prompt, ArticlePrompt};
pub use research::{build_image_prompt, build_research_prompt, ResearchPrompt};
pub use translation::{build_translation_prompt, TranslationPrompt};

use thiserror::Error;

/// Errors raised while rendering a prompt template.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to render prompt '{name}': {source}")]
    Render {
        name: &'static str,
        #[source]
        source: tera::Error,
    },
}

pub(crate) fn render(
    name: &'static str,
    template: &str,
    context: &tera::Context,
) -> Result<String, PromptError> {
    tera::Tera::one_off(template, context, false)
        .map(|rendered| rendered.trim().to_string())
        .map_err(|source| PromptError::Render { name, source })
}

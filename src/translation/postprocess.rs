//! Post-processing applied to translated posts before publication.
//!
//! Each enabled option records its flag name on the history record, so a
//! later audit can tell which transformations a published translation went
//! through.

use regex::{Captures, Regex};

use super::types::{PostProcessOptions, TranslationJob, TranslationTarget};
use crate::pipeline::slugify;

pub const REWRITE_INTERNAL_LINKS: &str = "rewrite_internal_links";
pub const LOCALIZE_SLUG: &str = "localize_slug";
pub const ADD_LANGUAGE_ATTRIBUTE: &str = "add_language_attribute";
pub const APPEND_SOURCE_NOTE: &str = "append_source_note";

/// A translated post on its way to the target site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPost {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub slug: String,
}

/// Points `href`s at the source site to the target site.
///
/// Only attribute values that start with `source_base` are touched; text
/// mentions of the domain are left alone.
pub fn rewrite_internal_links(content: &str, source_base: &str, target_base: &str) -> String {
    let source = source_base.trim_end_matches('/');
    let target = target_base.trim_end_matches('/');
    if source.is_empty() || source == target {
        return content.to_string();
    }

    let pattern = format!(r#"(?i)(href\s*=\s*["']){}"#, regex::escape(source));
    match Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(content, |caps: &Captures| format!("{}{}", &caps[1], target))
            .into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not build link rewrite pattern");
            content.to_string()
        }
    }
}

/// Slug derived from the translated title.
pub fn localize_slug(title: &str) -> String {
    slugify(title)
}

/// Wraps the body in a container carrying the language code.
pub fn add_language_attribute(content: &str, language: &str) -> String {
    format!(
        "<div lang=\"{}\">\n{}\n</div>",
        language.trim().to_lowercase(),
        content.trim()
    )
}

/// Appends a note linking back to the original post.
pub fn append_source_note(content: &str, source_link: &str, source_title: &str) -> String {
    format!(
        "{}\n<p class=\"autopress-source-note\"><em>Originally published as <a href=\"{}\">{}</a>.</em></p>",
        content.trim_end(),
        source_link,
        source_title
    )
}

/// Applies every enabled option in a fixed order and returns the names of
/// the ones applied.
///
/// Link rewriting needs both base URLs; without them it is skipped and not
/// recorded.
pub fn apply(
    post: &mut TranslatedPost,
    options: &PostProcessOptions,
    job: &TranslationJob,
    target: &TranslationTarget,
    source: (&str, &str),
) -> Vec<String> {
    let (source_link, source_title) = source;
    let mut applied = Vec::new();

    if options.rewrite_internal_links {
        if let (Some(from), Some(to)) = (&job.source_base_url, &target.base_url) {
            post.content = rewrite_internal_links(&post.content, from, to);
            applied.push(REWRITE_INTERNAL_LINKS.to_string());
        }
    }

    if options.localize_slug {
        let slug = localize_slug(&post.title);
        if !slug.is_empty() {
            post.slug = slug;
            applied.push(LOCALIZE_SLUG.to_string());
        }
    }

    if options.append_source_note && !source_link.is_empty() {
        post.content = append_source_note(&post.content, source_link, source_title);
        applied.push(APPEND_SOURCE_NOTE.to_string());
    }

    if options.add_language_attribute {
        post.content = add_language_attribute(&post.content, &target.language);
        applied.push(ADD_LANGUAGE_ATTRIBUTE.to_string());
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TranslationJob {
        TranslationJob::from_yaml_str(
            r#"
id: j
source_site_id: main
source_base_url: https://blog.example.com/
targets:
  - site_id: es
    language: ES
    base_url: https://es.example.com
"#,
        )
        .expect("valid job")
    }

    #[test]
    fn test_rewrite_only_touches_hrefs() {
        let html = r#"<p>Visit blog.example.com or <a href="https://blog.example.com/guide">the guide</a> and <a href='https://other.com/x'>x</a>.</p>"#;
        let out = rewrite_internal_links(html, "https://blog.example.com/", "https://es.example.com");
        assert!(out.contains(r#"href="https://es.example.com/guide""#));
        assert!(out.contains("Visit blog.example.com"));
        assert!(out.contains("https://other.com/x"));
    }

    #[test]
    fn test_rewrite_same_base_is_noop() {
        let html = r#"<a href="https://a.com/x">x</a>"#;
        assert_eq!(rewrite_internal_links(html, "https://a.com", "https://a.com/"), html);
    }

    #[test]
    fn test_language_attribute_wraps_body() {
        let out = add_language_attribute("<p>Hola</p>", "ES");
        assert_eq!(out, "<div lang=\"es\">\n<p>Hola</p>\n</div>");
    }

    #[test]
    fn test_apply_records_flags_in_order() {
        let job = job();
        let target = job.targets[0].clone();
        let options = PostProcessOptions {
            append_source_note: true,
            ..Default::default()
        };
        let mut post = TranslatedPost {
            title: "Consejos de Ahorro".to_string(),
            excerpt: String::new(),
            content: r#"<p><a href="https://blog.example.com/a">a</a></p>"#.to_string(),
            slug: "saving-tips".to_string(),
        };

        let applied = apply(
            &mut post,
            &options,
            &job,
            &target,
            ("https://blog.example.com/saving-tips", "Saving Tips"),
        );

        assert_eq!(
            applied,
            vec![
                REWRITE_INTERNAL_LINKS,
                LOCALIZE_SLUG,
                APPEND_SOURCE_NOTE,
                ADD_LANGUAGE_ATTRIBUTE
            ]
        );
        assert_eq!(post.slug, "consejos-de-ahorro");
        assert!(post.content.starts_with("<div lang=\"es\">"));
        assert!(post.content.contains("https://es.example.com/a"));
        assert!(post.content.contains("Originally published as"));
    }

    #[test]
    fn test_apply_without_bases_skips_link_rewrite() {
        let mut job = job();
        job.source_base_url = None;
        let target = job.targets[0].clone();
        let options = PostProcessOptions {
            localize_slug: false,
            add_language_attribute: false,
            ..Default::default()
        };
        let mut post = TranslatedPost {
            title: "T".to_string(),
            excerpt: String::new(),
            content: "<p>x</p>".to_string(),
            slug: "t".to_string(),
        };

        let applied = apply(&mut post, &options, &job, &target, ("", ""));
        assert!(applied.is_empty());
        assert_eq!(post.content, "<p>x</p>");
    }
}

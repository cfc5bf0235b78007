//! Small HTML/text helpers shared by content parsing, scoring and
//! post-processing. Generated articles are flat HTML or markdown, so these
//! work on regexes rather than a DOM.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static HIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Drops `<script>` and `<style>` elements together with their contents.
pub fn remove_hidden_elements(html: &str) -> Cow<'_, str> {
    HIDDEN_RE.replace_all(html, " ")
}

/// Removes tags, decodes the common entities and collapses whitespace.
/// Script and style contents are not visible text and are dropped.
pub fn strip_tags(html: &str) -> String {
    let visible = remove_hidden_elements(html);
    let without_tags = TAG_RE.replace_all(&visible, " ");
    let decoded = decode_entities(&without_tags);
    collapse_whitespace(&decoded)
}

/// Decodes the handful of entities LLMs and WordPress emit.
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#8217;", "'")
        .replace("&amp;", "&")
}

/// Collapses runs of whitespace into single spaces and trims.
pub fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Truncates to at most `max_chars` characters, ending with `…` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let kept: String = text.chars().take(max_chars - 1).collect();
    format!("{}…", kept.trim_end())
}

/// Counts whitespace-separated words of visible text.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

/// Escapes text for safe use inside an HTML attribute or element.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        let html = "<p>Hello <strong>world</strong> &amp; friends</p>\n<p>Again</p>";
        assert_eq!(strip_tags(html), "Hello world & friends Again");
    }

    #[test]
    fn test_strip_tags_drops_script_and_style() {
        let html = r#"<p>Visible</p><script type="application/ld+json">{"datePublished": "2024"}</script><STYLE>p { color: red }</STYLE>"#;
        assert_eq!(strip_tags(html), "Visible");
        assert!(!remove_hidden_elements(html).contains("datePublished"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        let long = "a".repeat(200);
        let cut = truncate_chars(&long, 160);
        assert_eq!(cut.chars().count(), 160);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_word_count_ignores_punctuation() {
        assert_eq!(word_count("one two - three"), 3);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"a "b" <c>"#), "a &quot;b&quot; &lt;c&gt;");
    }
}

//! Text statistics extracted once and shared by every scorer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::utils::html::{strip_tags, word_count};

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(<h[2-6][\s>])|(^#{2,6}\s)").expect("valid regex")
});

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<a\s[^>]*href\s*=\s*["']([^"']+)["'])|(\]\((https?://[^)\s]+)\))"#)
        .expect("valid regex")
});

static LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)(<li[\s>])|(^\s*(?:[-*]|\d+\.)\s)").expect("valid regex"));

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(\s|$)").expect("valid regex"));

/// Simple counts over an article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    pub word_count: usize,
    pub heading_count: usize,
    pub link_count: usize,
    pub external_link_count: usize,
    pub list_item_count: usize,
    pub sentence_count: usize,
}

impl TextStats {
    /// Collects statistics from HTML or markdown content.
    pub fn collect(content: &str) -> Self {
        let plain = strip_tags(content);

        let mut link_count = 0;
        let mut external_link_count = 0;
        for caps in LINK_RE.captures_iter(content) {
            link_count += 1;
            let target = caps.get(2).or_else(|| caps.get(4)).map(|m| m.as_str());
            if target.is_some_and(|t| t.starts_with("http://") || t.starts_with("https://")) {
                external_link_count += 1;
            }
        }

        Self {
            word_count: word_count(&plain),
            heading_count: HEADING_RE.find_iter(content).count(),
            link_count,
            external_link_count,
            list_item_count: LIST_RE.find_iter(content).count(),
            sentence_count: SENTENCE_END_RE.find_iter(&plain).count().max(1),
        }
    }

    /// Average words per sentence.
    pub fn avg_sentence_length(&self) -> f64 {
        self.word_count as f64 / self.sentence_count.max(1) as f64
    }
}

/// Splits visible text into rough sentences.
pub fn sentences(plain: &str) -> Vec<&str> {
    SENTENCE_END_RE
        .split(plain)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_html() {
        let html = r#"<h2>Intro</h2><p>One two three. Four five.</p>
<h2>More</h2><ul><li>a</li><li>b</li></ul>
<p>See <a href="https://example.org/x">this</a> and <a href="/local">that</a>.</p>"#;
        let stats = TextStats::collect(html);

        assert_eq!(stats.heading_count, 2);
        assert_eq!(stats.link_count, 2);
        assert_eq!(stats.external_link_count, 1);
        assert_eq!(stats.list_item_count, 2);
        assert!(stats.word_count >= 10);
    }

    #[test]
    fn test_collect_markdown() {
        let md = "## Heading\n\n- item one\n- item two\n\nRead [docs](https://docs.rs/x).";
        let stats = TextStats::collect(md);

        assert_eq!(stats.heading_count, 1);
        assert_eq!(stats.list_item_count, 2);
        assert_eq!(stats.external_link_count, 1);
    }

    #[test]
    fn test_sentences() {
        assert_eq!(sentences("A b. C d! E?"), vec!["A b", "C d", "E"]);
    }
}

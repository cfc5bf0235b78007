//! Campaign configuration and source items.
//!
//! A [`Campaign`] describes a recurring content job: where to publish, what
//! kind of article to write, which optional stages run, which handlers to
//! prefer and how strict the quality gate is. Campaigns are YAML documents:
//!
//! ```yaml
//! id: budget-tips
//! target_site_id: main-blog
//! article_type: listicle
//! tone: friendly
//! stages:
//!   research: true
//!   structured_data: true
//! providers:
//!   text: [openai]
//! images:
//!   strategy: parallel_rank
//!   inline_count: 2
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::hosting::PostStatus;
use crate::providers::{Capability, HandlerKind};
use crate::quality::QualityPolicy;

/// Maximum number of inline images per article.
pub const MAX_INLINE_IMAGES: usize = 5;

/// Errors raised while loading or validating a campaign.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid campaign '{id}': {message}")]
    Invalid { id: String, message: String },
}

/// Shape of the generated article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleType {
    #[default]
    Guide,
    Listicle,
    HowTo,
    Review,
    News,
    Comparison,
}

impl ArticleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleType::Guide => "guide",
            ArticleType::Listicle => "listicle",
            ArticleType::HowTo => "how_to",
            ArticleType::Review => "review",
            ArticleType::News => "news",
            ArticleType::Comparison => "comparison",
        }
    }

    /// Human-readable description used in prompts.
    pub fn describe(&self) -> &'static str {
        match self {
            ArticleType::Guide => "a comprehensive guide",
            ArticleType::Listicle => "a numbered list article",
            ArticleType::HowTo => "a step-by-step how-to tutorial",
            ArticleType::Review => "an in-depth, balanced review",
            ArticleType::News => "a timely news article",
            ArticleType::Comparison => "a side-by-side comparison",
        }
    }
}

impl fmt::Display for ArticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// Which optional pipeline stages run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageToggles {
    #[serde(default)]
    pub research: bool,
    #[serde(default = "default_true")]
    pub images: bool,
    #[serde(default)]
    pub seo_linking: bool,
    #[serde(default)]
    pub structured_data: bool,
    #[serde(default)]
    pub rewriting: bool,
    #[serde(default = "default_true")]
    pub quality_gate: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            research: false,
            images: true,
            seo_linking: false,
            structured_data: false,
            rewriting: false,
            quality_gate: true,
        }
    }
}

/// Preferred handlers per capability, tried before the default order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPreferences {
    #[serde(default)]
    pub research: Vec<HandlerKind>,
    #[serde(default)]
    pub text: Vec<HandlerKind>,
    #[serde(default)]
    pub image: Vec<HandlerKind>,
}

impl ProviderPreferences {
    pub fn for_capability(&self, capability: Capability) -> &[HandlerKind] {
        match capability {
            Capability::Research => &self.research,
            Capability::GenerateText => &self.text,
            Capability::GenerateImage => &self.image,
        }
    }
}

/// How image slots are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStrategy {
    /// Per slot, try each source in order until one works.
    #[default]
    SequentialFallback,
    /// Query every source concurrently, score and rank the pool.
    ParallelRank,
}

/// A category of image source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Generated through the image capability.
    Ai,
    /// Searched in registered stock libraries.
    Stock,
}

fn default_image_sources() -> Vec<ImageSource> {
    vec![ImageSource::Ai]
}

fn default_inline_count() -> usize {
    2
}

/// Image acquisition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default)]
    pub strategy: ImageStrategy,
    #[serde(default = "default_true")]
    pub cover: bool,
    #[serde(default = "default_inline_count")]
    pub inline_count: usize,
    /// Source categories in preference order.
    #[serde(default = "default_image_sources")]
    pub sources: Vec<ImageSource>,
    /// Overrides the process-wide fan-out deadline.
    #[serde(default)]
    pub fanout_timeout_secs: Option<u64>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            strategy: ImageStrategy::default(),
            cover: true,
            inline_count: default_inline_count(),
            sources: default_image_sources(),
            fanout_timeout_secs: None,
        }
    }
}

/// A writer persona that articles can be attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    /// Campaign-local key, used in `mappings`.
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Keywords matched against topics.
    #[serde(default)]
    pub expertise: Vec<String>,
}

/// Author attribution settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSettings {
    /// Site author used when nothing else matches.
    #[serde(default)]
    pub default_author_id: Option<u64>,
    #[serde(default)]
    pub pool: Vec<AuthorProfile>,
    /// Profile key to site author id.
    #[serde(default)]
    pub mappings: HashMap<String, u64>,
    /// Create a site author for matched profiles without a mapping.
    #[serde(default)]
    pub auto_provision: bool,
}

/// A link target for internal link injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLink {
    pub url: String,
    /// Phrases that should become anchors for this URL.
    pub keywords: Vec<String>,
}

fn default_tone() -> String {
    "professional".to_string()
}

fn default_word_count() -> u32 {
    1500
}

fn default_max_internal_links() -> usize {
    3
}

/// Configuration for a recurring content-production job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub target_site_id: String,
    #[serde(default)]
    pub article_type: ArticleType,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default = "default_word_count")]
    pub target_word_count: u32,
    #[serde(default)]
    pub include_faq: bool,
    #[serde(default)]
    pub include_toc: bool,
    #[serde(default)]
    pub stages: StageToggles,
    #[serde(default)]
    pub providers: ProviderPreferences,
    #[serde(default)]
    pub images: ImageSettings,
    #[serde(default)]
    pub quality: QualityPolicy,
    #[serde(default)]
    pub post_status: PostStatus,
    #[serde(default)]
    pub categories: Vec<u64>,
    #[serde(default)]
    pub authors: AuthorSettings,
    #[serde(default)]
    pub internal_links: Vec<InternalLink>,
    #[serde(default = "default_max_internal_links")]
    pub max_internal_links: usize,
}

impl Campaign {
    /// A campaign with defaults for everything but the identifiers.
    pub fn new(id: impl Into<String>, target_site_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            target_site_id: target_site_id.into(),
            article_type: ArticleType::default(),
            tone: default_tone(),
            target_word_count: default_word_count(),
            include_faq: false,
            include_toc: false,
            stages: StageToggles::default(),
            providers: ProviderPreferences::default(),
            images: ImageSettings::default(),
            quality: QualityPolicy::default(),
            post_status: PostStatus::default(),
            categories: Vec::new(),
            authors: AuthorSettings::default(),
            internal_links: Vec::new(),
            max_internal_links: default_max_internal_links(),
        }
    }

    /// Parses and validates a campaign from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CampaignError> {
        let campaign: Campaign = serde_yaml::from_str(yaml)?;
        campaign.validate()?;
        Ok(campaign)
    }

    /// Loads and validates a campaign file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CampaignError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), CampaignError> {
        let invalid = |message: String| CampaignError::Invalid {
            id: self.id.clone(),
            message,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id cannot be empty".to_string()));
        }
        if self.target_site_id.trim().is_empty() {
            return Err(invalid("target_site_id cannot be empty".to_string()));
        }
        if self.target_word_count == 0 {
            return Err(invalid("target_word_count must be greater than 0".to_string()));
        }
        if self.images.inline_count > MAX_INLINE_IMAGES {
            return Err(invalid(format!(
                "images.inline_count must be at most {}",
                MAX_INLINE_IMAGES
            )));
        }
        if self.stages.images && self.images.sources.is_empty() {
            return Err(invalid("images.sources cannot be empty when images are enabled".to_string()));
        }
        if self.quality.approve_threshold > 100 {
            return Err(invalid("quality.approve_threshold must be at most 100".to_string()));
        }
        if self.quality.retry_threshold > self.quality.approve_threshold {
            return Err(invalid(
                "quality.retry_threshold cannot exceed quality.approve_threshold".to_string(),
            ));
        }
        for key in self.authors.mappings.keys() {
            if !self.authors.pool.iter().any(|a| &a.key == key) {
                return Err(invalid(format!("author mapping '{}' has no profile", key)));
            }
        }

        Ok(())
    }

    /// Rejects image sources the running process has no backend for.
    pub fn check_image_sources(&self, stock_available: bool) -> Result<(), CampaignError> {
        if self.stages.images
            && self.images.sources.contains(&ImageSource::Stock)
            && !stock_available
        {
            return Err(CampaignError::Invalid {
                id: self.id.clone(),
                message: "images.sources lists 'stock' but no stock library is configured"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Picks the author whose expertise best overlaps the topic.
    ///
    /// Ties go to the earlier profile; no overlap means no match.
    pub fn match_author(&self, topic: &str, keywords: &[String]) -> Option<&AuthorProfile> {
        let haystack = format!("{} {}", topic, keywords.join(" ")).to_lowercase();

        let mut best: Option<(&AuthorProfile, usize)> = None;
        for author in &self.authors.pool {
            let overlap = author
                .expertise
                .iter()
                .filter(|e| !e.trim().is_empty() && haystack.contains(&e.to_lowercase()))
                .count();
            if overlap == 0 {
                continue;
            }
            match best {
                Some((_, top)) if overlap <= top => {}
                _ => best = Some((author, overlap)),
            }
        }

        best.map(|(author, _)| author)
    }
}

/// A unit of work: one topic to write about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SourceItem {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMPAIGN_YAML: &str = r#"
id: budget-tips
target_site_id: main-blog
article_type: listicle
tone: friendly
include_faq: true
stages:
  research: true
  structured_data: true
providers:
  text: [openai, gemini]
images:
  strategy: parallel_rank
  inline_count: 3
quality:
  approve_threshold: 80
post_status: draft
authors:
  default_author_id: 1
  auto_provision: true
  pool:
    - key: jane
      name: Jane Doe
      expertise: [budget, savings]
    - key: raj
      name: Raj Patel
      expertise: [investing, budget, retirement]
  mappings:
    jane: 7
"#;

    #[test]
    fn test_parse_campaign() {
        let campaign = Campaign::from_yaml_str(CAMPAIGN_YAML).expect("valid campaign");

        assert_eq!(campaign.article_type, ArticleType::Listicle);
        assert!(campaign.stages.research);
        assert!(campaign.stages.images);
        assert!(!campaign.stages.rewriting);
        assert_eq!(campaign.images.strategy, ImageStrategy::ParallelRank);
        assert_eq!(campaign.images.inline_count, 3);
        assert_eq!(campaign.quality.approve_threshold, 80);
        assert_eq!(campaign.quality.retry_threshold, 40);
        assert_eq!(campaign.post_status, PostStatus::Draft);
        assert_eq!(
            campaign.providers.for_capability(Capability::GenerateText),
            &[HandlerKind::OpenAi, HandlerKind::Gemini]
        );
        assert_eq!(campaign.target_word_count, 1500);
    }

    #[test]
    fn test_inline_count_capped() {
        let mut campaign = Campaign::new("c", "s");
        campaign.images.inline_count = 6;
        let err = campaign.validate().expect_err("too many inline images");
        assert!(err.to_string().contains("inline_count"));
    }

    #[test]
    fn test_thresholds_ordered() {
        let mut campaign = Campaign::new("c", "s");
        campaign.quality.retry_threshold = 90;
        assert!(campaign.validate().is_err());
    }

    #[test]
    fn test_stock_source_requires_library() {
        let mut campaign = Campaign::new("c", "s");
        assert_eq!(campaign.images.sources, vec![ImageSource::Ai]);
        assert!(campaign.check_image_sources(false).is_ok());

        campaign.images.sources = vec![ImageSource::Ai, ImageSource::Stock];
        let err = campaign.check_image_sources(false).expect_err("no stock library");
        assert!(err.to_string().contains("stock"));
        assert!(campaign.check_image_sources(true).is_ok());

        campaign.stages.images = false;
        assert!(campaign.check_image_sources(false).is_ok());
    }

    #[test]
    fn test_mapping_requires_profile() {
        let mut campaign = Campaign::new("c", "s");
        campaign.authors.mappings.insert("ghost".to_string(), 3);
        assert!(campaign.validate().is_err());
    }

    #[test]
    fn test_match_author_best_overlap() {
        let campaign = Campaign::from_yaml_str(CAMPAIGN_YAML).expect("valid campaign");

        let author = campaign
            .match_author("Budget investing for retirement", &[])
            .expect("match");
        assert_eq!(author.key, "raj");

        // Tie on a single keyword goes to the first profile.
        let author = campaign.match_author("Budget basics", &[]).expect("match");
        assert_eq!(author.key, "jane");

        assert!(campaign.match_author("Gardening", &[]).is_none());
    }

    #[test]
    fn test_match_author_uses_keywords() {
        let campaign = Campaign::from_yaml_str(CAMPAIGN_YAML).expect("valid campaign");
        let author = campaign
            .match_author("Weekly tips", &["savings".to_string()])
            .expect("match");
        assert_eq!(author.key, "jane");
    }
}

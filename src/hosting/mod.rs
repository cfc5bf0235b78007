//! Article hosting boundary.
//!
//! The pipeline publishes through the [`ArticleHost`] trait; the
//! [`wordpress`] module provides the WordPress REST implementation and
//! [`media`] fetches images for re-upload.

pub mod media;
pub mod wordpress;

pub use media::{FetchedMedia, MediaFetcher, MediaTransport, ReqwestTransport};
pub use wordpress::{SiteConfig, SiteRegistry, WordPressHost};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::campaign::AuthorProfile;
use crate::error::HostError;

/// Post visibility on the destination site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Publish,
    Draft,
    Pending,
    Private,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Publish => "publish",
            PostStatus::Draft => "draft",
            PostStatus::Pending => "pending",
            PostStatus::Private => "private",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post ready for submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    pub status: PostStatus,
    pub categories: Vec<u64>,
    pub author: Option<u64>,
    pub featured_media: Option<u64>,
}

/// Identity of a created or updated post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub id: u64,
    pub link: String,
}

/// A post as stored on the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: u64,
    pub link: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    pub status: String,
    pub categories: Vec<u64>,
    pub featured_media: Option<u64>,
    pub author: Option<u64>,
}

/// Partial update of an existing post. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<u64>,
}

/// Bytes to upload to the host's media library.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
}

/// Identity of an uploaded media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: u64,
    pub url: String,
}

/// Query filters for listing posts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFilters {
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub categories: Vec<u64>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub per_page: Option<u32>,
    /// ISO-8601 lower bound on publish date.
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub include: Vec<u64>,
}

/// A destination that stores posts, media and authors.
#[async_trait]
pub trait ArticleHost: Send + Sync {
    async fn create_post(&self, site_id: &str, draft: &PostDraft) -> Result<PostRef, HostError>;

    async fn upload_media(&self, site_id: &str, upload: MediaUpload)
        -> Result<MediaRef, HostError>;

    async fn update_post(
        &self,
        site_id: &str,
        post_id: u64,
        update: &PostUpdate,
    ) -> Result<PostRef, HostError>;

    async fn get_post(&self, site_id: &str, post_id: u64) -> Result<PublishedPost, HostError>;

    async fn get_posts(
        &self,
        site_id: &str,
        filters: &PostFilters,
    ) -> Result<Vec<PublishedPost>, HostError>;

    /// Creates (or finds) a site author for a profile and returns its id.
    async fn provision_author(
        &self,
        site_id: &str,
        profile: &AuthorProfile,
    ) -> Result<u64, HostError>;
}

//! WordPress REST v2 host.
//!
//! Sites authenticate with application passwords over HTTP Basic auth.
//! Site credentials come from a YAML registry:
//!
//! ```yaml
//! sites:
//!   - id: main-blog
//!     base_url: https://blog.example.com
//!     username: editor
//!     app_password: "abcd efgh ijkl mnop"
//!     language: en
//! ```

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::{
    ArticleHost, MediaRef, MediaUpload, PostDraft, PostFilters, PostRef, PostUpdate,
    PublishedPost,
};
use crate::campaign::AuthorProfile;
use crate::config::ConfigError;
use crate::error::HostError;
use crate::pipeline::content::slugify;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection details for one WordPress site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub id: String,
    pub base_url: String,
    pub username: String,
    pub app_password: String,
    #[serde(default)]
    pub language: Option<String>,
}

impl SiteConfig {
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/wp-json/wp/v2/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.app_password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    fn host_name(&self) -> &str {
        self.base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or("localhost")
    }
}

/// All configured sites, keyed by id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteRegistry {
    sites: Vec<SiteConfig>,
}

impl SiteRegistry {
    pub fn new(sites: Vec<SiteConfig>) -> Self {
        Self { sites }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let registry: SiteRegistry = serde_yaml::from_str(yaml)?;
        for site in &registry.sites {
            if site.id.trim().is_empty() || site.base_url.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "every site needs an id and a base_url".to_string(),
                ));
            }
        }
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn get(&self, site_id: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.id == site_id)
    }

    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }
}

/// WordPress implementation of [`ArticleHost`].
pub struct WordPressHost {
    sites: HashMap<String, SiteConfig>,
    client: Client,
}

impl WordPressHost {
    pub fn new(registry: SiteRegistry) -> Result<Self, HostError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HostError::RequestFailed(e.to_string()))?;

        let sites = registry
            .sites
            .into_iter()
            .map(|site| (site.id.clone(), site))
            .collect();

        Ok(Self { sites, client })
    }

    fn site(&self, site_id: &str) -> Result<&SiteConfig, HostError> {
        self.sites
            .get(site_id)
            .ok_or_else(|| HostError::UnknownSite(site_id.to_string()))
    }

    fn request(&self, site: &SiteConfig, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", site.auth_header())
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, HostError> {
        let response = request
            .send()
            .await
            .map_err(|e| HostError::RequestFailed(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| HostError::ParseError(e.to_string()))
    }

    async fn find_user(&self, site: &SiteConfig, username: &str) -> Result<u64, HostError> {
        let request = self
            .request(site, self.client.get(site.api_url("users")))
            .query(&[("search", username), ("context", "edit")]);
        let users: Vec<WpUser> = self.send_json(request).await?;
        users
            .into_iter()
            .find(|u| u.slug.as_deref() == Some(username))
            .map(|u| u.id)
            .ok_or_else(|| HostError::ApiError {
                code: 404,
                message: format!("user '{}' exists but could not be found", username),
            })
    }
}

#[async_trait]
impl ArticleHost for WordPressHost {
    async fn create_post(&self, site_id: &str, draft: &PostDraft) -> Result<PostRef, HostError> {
        let site = self.site(site_id)?;
        let body = WpPostBody {
            title: &draft.title,
            content: &draft.content,
            excerpt: &draft.excerpt,
            slug: &draft.slug,
            status: draft.status.as_str(),
            categories: &draft.categories,
            author: draft.author,
            featured_media: draft.featured_media,
        };

        let request = self
            .request(site, self.client.post(site.api_url("posts")))
            .json(&body);
        let created: WpPostRef = self.send_json(request).await?;

        tracing::info!(site = %site_id, post_id = created.id, "Post created");
        Ok(PostRef {
            id: created.id,
            link: created.link,
        })
    }

    async fn upload_media(
        &self,
        site_id: &str,
        upload: MediaUpload,
    ) -> Result<MediaRef, HostError> {
        let site = self.site(site_id)?;
        if upload.bytes.is_empty() {
            return Err(HostError::UploadRejected("empty file".to_string()));
        }

        let request = self
            .request(site, self.client.post(site.api_url("media")))
            .header("Content-Type", upload.mime_type.as_str())
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", upload.filename),
            )
            .body(upload.bytes);
        let media: WpMedia = self.send_json(request).await?;

        if upload.alt_text.is_some() || upload.caption.is_some() {
            let meta = WpMediaMeta {
                alt_text: upload.alt_text.as_deref(),
                caption: upload.caption.as_deref(),
            };
            let request = self
                .request(
                    site,
                    self.client.post(site.api_url(&format!("media/{}", media.id))),
                )
                .json(&meta);
            if let Err(e) = self.send_json::<serde_json::Value>(request).await {
                tracing::warn!(media_id = media.id, error = %e, "Failed to set media alt text");
            }
        }

        Ok(MediaRef {
            id: media.id,
            url: media.source_url,
        })
    }

    async fn update_post(
        &self,
        site_id: &str,
        post_id: u64,
        update: &PostUpdate,
    ) -> Result<PostRef, HostError> {
        let site = self.site(site_id)?;
        let request = self
            .request(
                site,
                self.client.post(site.api_url(&format!("posts/{}", post_id))),
            )
            .json(update);
        let updated: WpPostRef = self.send_json(request).await.map_err(|e| match e {
            HostError::ApiError { code: 404, .. } => HostError::PostNotFound(post_id),
            other => other,
        })?;

        Ok(PostRef {
            id: updated.id,
            link: updated.link,
        })
    }

    async fn get_post(&self, site_id: &str, post_id: u64) -> Result<PublishedPost, HostError> {
        let site = self.site(site_id)?;
        let request = self.request(
            site,
            self.client.get(site.api_url(&format!("posts/{}", post_id))),
        );
        let post: WpPost = self.send_json(request).await.map_err(|e| match e {
            HostError::ApiError { code: 404, .. } => HostError::PostNotFound(post_id),
            other => other,
        })?;
        Ok(post.into())
    }

    async fn get_posts(
        &self,
        site_id: &str,
        filters: &PostFilters,
    ) -> Result<Vec<PublishedPost>, HostError> {
        let site = self.site(site_id)?;
        let request = self
            .request(site, self.client.get(site.api_url("posts")))
            .query(&filter_query(filters));
        let posts: Vec<WpPost> = self.send_json(request).await?;
        Ok(posts.into_iter().map(Into::into).collect())
    }

    async fn provision_author(
        &self,
        site_id: &str,
        profile: &AuthorProfile,
    ) -> Result<u64, HostError> {
        let site = self.site(site_id)?;
        let username = slugify(&profile.name);
        let email = profile
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@{}", username, site.host_name()));

        let body = WpNewUser {
            username: &username,
            name: &profile.name,
            email: &email,
            password: uuid::Uuid::new_v4().to_string(),
            description: profile.bio.as_deref().unwrap_or_default(),
            roles: vec!["author"],
        };

        let request = self
            .request(site, self.client.post(site.api_url("users")))
            .json(&body);
        match self.send_json::<WpUser>(request).await {
            Ok(user) => {
                tracing::info!(site = %site_id, author = %profile.name, user_id = user.id, "Author provisioned");
                Ok(user.id)
            }
            Err(HostError::ApiError { ref message, .. }) if message.contains("existing_user") => {
                self.find_user(site, &username).await
            }
            Err(e) => Err(e),
        }
    }
}

fn filter_query(filters: &PostFilters) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(status) = filters.status {
        query.push(("status", status.as_str().to_string()));
    }
    if !filters.categories.is_empty() {
        query.push(("categories", join_ids(&filters.categories)));
    }
    if let Some(ref search) = filters.search {
        query.push(("search", search.clone()));
    }
    if let Some(per_page) = filters.per_page {
        query.push(("per_page", per_page.min(100).to_string()));
    }
    if let Some(ref after) = filters.after {
        query.push(("after", after.clone()));
    }
    if !filters.include.is_empty() {
        query.push(("include", join_ids(&filters.include)));
    }
    query
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

async fn check_status(response: Response) -> Result<Response, HostError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    // WordPress errors look like {"code": "...", "message": "..."}.
    let message = serde_json::from_str::<WpError>(&text)
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or(text);

    if status == StatusCode::PAYLOAD_TOO_LARGE || status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
        return Err(HostError::UploadRejected(message));
    }

    Err(HostError::ApiError {
        code: status.as_u16(),
        message,
    })
}

#[derive(Debug, Serialize)]
struct WpPostBody<'a> {
    title: &'a str,
    content: &'a str,
    excerpt: &'a str,
    slug: &'a str,
    status: &'a str,
    categories: &'a [u64],
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    featured_media: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WpPostRef {
    id: u64,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: u64,
    #[serde(default)]
    link: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    content: Rendered,
    #[serde(default)]
    excerpt: Rendered,
    #[serde(default)]
    categories: Vec<u64>,
    #[serde(default)]
    featured_media: u64,
    #[serde(default)]
    author: u64,
}

impl From<WpPost> for PublishedPost {
    fn from(post: WpPost) -> Self {
        Self {
            id: post.id,
            link: post.link,
            title: post.title.rendered,
            content: post.content.rendered,
            excerpt: post.excerpt.rendered,
            slug: post.slug,
            status: post.status,
            categories: post.categories,
            // WordPress uses 0 for "none".
            featured_media: Some(post.featured_media).filter(|id| *id != 0),
            author: Some(post.author).filter(|id| *id != 0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WpMedia {
    id: u64,
    #[serde(default)]
    source_url: String,
}

#[derive(Debug, Serialize)]
struct WpMediaMeta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    alt_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WpNewUser<'a> {
    username: &'a str,
    name: &'a str,
    email: &'a str,
    password: String,
    description: &'a str,
    roles: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WpUser {
    id: u64,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WpError {
    code: String,
    message: String,
}

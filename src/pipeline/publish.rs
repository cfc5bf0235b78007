//! Publication stage and image repair.
//!
//! Uploads images, resolves the post author, submits the post and, as a
//! separate operation, repairs images on an already published post.
//! Individual media failures never abort a publish; they are reported.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use thiserror::Error;

use super::content::slugify;
use super::context::{AcquiredImage, GeneratedImages, ImageSlot, Placement, RunContext, SlotFailure};
use super::images::ImageAcquirer;
use crate::campaign::{AuthorProfile, Campaign};
use crate::error::HostError;
use crate::hosting::{ArticleHost, MediaFetcher, PostDraft, PostStatus, PostUpdate};
use crate::providers::Capability;
use crate::utils::html::{escape, strip_tags};

/// CSS class marking figures inserted by the publisher.
const FIGURE_CLASS: &str = "autopress-figure";

static FIGURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\s*<figure class="autopress-figure[^"]*".*?</figure>"#)
        .expect("valid regex")
});

static IMG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid regex"));

static SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

/// Errors raised while publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("No generated content to publish")]
    NoContent,

    #[error("No images could be acquired for post {post_id}: {reasons}")]
    NoImages { post_id: u64, reasons: String },
}

/// What a successful publish produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub post_id: u64,
    pub link: String,
    pub status: PostStatus,
    pub author: Option<u64>,
    pub featured_media: Option<u64>,
    pub inline_uploaded: usize,
    /// Images that were acquired but could not be fetched or uploaded.
    pub failed_uploads: Vec<SlotFailure>,
    pub warnings: Vec<String>,
}

/// Outcome of [`Publisher::repair_images`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub post_id: u64,
    pub link: String,
    pub featured_media: Option<u64>,
    pub inline_inserted: usize,
    pub failures: Vec<SlotFailure>,
    /// False when the post already had a cover and no broken images.
    pub repaired: bool,
}

/// Images uploaded to the host, ready to reference from the post.
#[derive(Debug, Default)]
struct UploadedImages {
    featured: Option<u64>,
    figures: Vec<(Placement, String)>,
    failures: Vec<SlotFailure>,
}

/// Submits posts and their media to an [`ArticleHost`].
pub struct Publisher {
    host: Arc<dyn ArticleHost>,
    fetcher: Arc<MediaFetcher>,
    acquirer: Arc<ImageAcquirer>,
}

impl Publisher {
    pub fn new(
        host: Arc<dyn ArticleHost>,
        fetcher: Arc<MediaFetcher>,
        acquirer: Arc<ImageAcquirer>,
    ) -> Self {
        Self {
            host,
            fetcher,
            acquirer,
        }
    }

    /// Publishes the run's content to the campaign's target site.
    pub async fn publish(
        &self,
        campaign: &Campaign,
        ctx: &RunContext,
    ) -> Result<PublishResult, PublishError> {
        let content = ctx.content.as_ref().ok_or(PublishError::NoContent)?;
        let site = campaign.target_site_id.as_str();
        let mut warnings = Vec::new();

        let uploaded = self.upload_images(site, &content.slug, &ctx.images).await;
        for failure in &uploaded.failures {
            warnings.push(format!("image {} not uploaded: {}", failure.slot, failure.reason));
        }

        let author = self
            .resolve_author(campaign, ctx.matched_author.as_ref(), &mut warnings)
            .await;

        let draft = PostDraft {
            title: content.title.clone(),
            content: insert_figures(&content.body, &uploaded.figures),
            excerpt: content.excerpt.clone(),
            slug: content.slug.clone(),
            status: campaign.post_status,
            categories: campaign.categories.clone(),
            author,
            featured_media: uploaded.featured,
        };

        let post = self.host.create_post(site, &draft).await?;

        tracing::info!(
            run_id = %ctx.run_id,
            site = site,
            post_id = post.id,
            link = %post.link,
            status = %campaign.post_status,
            "Post published"
        );

        Ok(PublishResult {
            post_id: post.id,
            link: post.link,
            status: campaign.post_status,
            author,
            featured_media: uploaded.featured,
            inline_uploaded: uploaded.figures.len(),
            failed_uploads: uploaded.failures,
            warnings,
        })
    }

    /// Re-acquires images for a published post and attaches them.
    ///
    /// A post with a featured image and no broken `<img>` tags is left
    /// untouched. Otherwise broken tags and previously inserted figures are
    /// removed and fresh images uploaded; the featured image is only
    /// overwritten when a new cover was uploaded.
    pub async fn repair_images(
        &self,
        campaign: &Campaign,
        post_id: u64,
    ) -> Result<RepairReport, PublishError> {
        let site = campaign.target_site_id.as_str();
        let post = self.host.get_post(site, post_id).await?;

        if post.featured_media.is_some() && !has_broken_images(&post.content) {
            tracing::info!(site = site, post_id = post_id, "Post images intact, nothing to repair");
            return Ok(RepairReport {
                post_id,
                link: post.link,
                featured_media: post.featured_media,
                inline_inserted: 0,
                failures: Vec::new(),
                repaired: false,
            });
        }

        let title = strip_tags(&post.title);

        let images = self
            .acquirer
            .acquire(
                &title,
                &campaign.images,
                campaign.providers.for_capability(Capability::GenerateImage),
            )
            .await;

        if images.is_empty() {
            let reasons = images
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.slot, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PublishError::NoImages { post_id, reasons });
        }

        let base_name = if post.slug.is_empty() {
            slugify(&title)
        } else {
            post.slug.clone()
        };
        let uploaded = self.upload_images(site, &base_name, &images).await;

        let cleaned = remove_broken_images(&FIGURE_RE.replace_all(&post.content, ""));
        let update = PostUpdate {
            content: Some(insert_figures(&cleaned, &uploaded.figures)),
            featured_media: uploaded.featured.or(post.featured_media),
            ..PostUpdate::default()
        };
        let updated = self.host.update_post(site, post_id, &update).await?;

        let mut failures = images.failures;
        failures.extend(uploaded.failures);

        tracing::info!(
            site = site,
            post_id = post_id,
            featured = ?uploaded.featured,
            inline = uploaded.figures.len(),
            failed = failures.len(),
            "Post images repaired"
        );

        Ok(RepairReport {
            post_id,
            link: updated.link,
            featured_media: uploaded.featured,
            inline_inserted: uploaded.figures.len(),
            failures,
            repaired: true,
        })
    }

    async fn upload_images(
        &self,
        site: &str,
        base_name: &str,
        images: &GeneratedImages,
    ) -> UploadedImages {
        let mut uploaded = UploadedImages::default();

        if let Some(cover) = &images.cover {
            match self.upload_one(site, base_name, cover).await {
                Ok((id, _)) => uploaded.featured = Some(id),
                Err(reason) => uploaded.failures.push(SlotFailure {
                    slot: cover.slot.to_string(),
                    reason,
                }),
            }
        }

        for image in &images.inline {
            let Some(placement) = image.slot.placement() else {
                continue;
            };
            match self.upload_one(site, base_name, image).await {
                Ok((id, url)) => uploaded.figures.push((placement, figure_html(id, &url, image))),
                Err(reason) => uploaded.failures.push(SlotFailure {
                    slot: image.slot.to_string(),
                    reason,
                }),
            }
        }

        uploaded
    }

    async fn upload_one(
        &self,
        site: &str,
        base_name: &str,
        image: &AcquiredImage,
    ) -> Result<(u64, String), String> {
        let media = self
            .fetcher
            .fetch(&image.url)
            .await
            .map_err(|e| format!("fetch failed: {}", e))?;

        let suffix = match image.slot {
            ImageSlot::Cover => "cover".to_string(),
            ImageSlot::Inline { index, .. } => format!("inline-{}", index),
        };
        let mut upload = media.into_upload(&format!("{}-{}", base_name, suffix), Some(image.alt.clone()));
        upload.caption = image.photographer.as_ref().map(|p| format!("Photo: {}", p));

        let media_ref = self
            .host
            .upload_media(site, upload)
            .await
            .map_err(|e| format!("upload failed: {}", e))?;

        tracing::debug!(site = site, slot = %image.slot, media_id = media_ref.id, "Image uploaded");
        Ok((media_ref.id, media_ref.url))
    }

    /// Picks the site author for a post.
    ///
    /// An explicit mapping for the matched profile wins; an unmapped match
    /// is provisioned when the campaign allows it; otherwise the campaign
    /// default applies.
    async fn resolve_author(
        &self,
        campaign: &Campaign,
        matched: Option<&AuthorProfile>,
        warnings: &mut Vec<String>,
    ) -> Option<u64> {
        let default = campaign.authors.default_author_id;
        let Some(profile) = matched else {
            return default;
        };

        if let Some(id) = campaign.authors.mappings.get(&profile.key) {
            return Some(*id);
        }

        if campaign.authors.auto_provision {
            match self
                .host
                .provision_author(&campaign.target_site_id, profile)
                .await
            {
                Ok(id) => {
                    tracing::info!(author = %profile.name, author_id = id, "Author provisioned");
                    return Some(id);
                }
                Err(e) => warnings.push(format!(
                    "could not provision author '{}': {}",
                    profile.name, e
                )),
            }
        }

        default
    }
}

fn is_broken_image(tag: &str) -> bool {
    match SRC_RE.captures(tag) {
        Some(caps) => caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or(true, |src| src.as_str().trim().is_empty()),
        None => true,
    }
}

fn has_broken_images(html: &str) -> bool {
    IMG_RE.find_iter(html).any(|m| is_broken_image(m.as_str()))
}

fn remove_broken_images(html: &str) -> String {
    IMG_RE
        .replace_all(html, |caps: &regex::Captures| {
            if is_broken_image(&caps[0]) {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn figure_html(media_id: u64, url: &str, image: &AcquiredImage) -> String {
    let caption = image
        .photographer
        .as_ref()
        .map(|p| format!("<figcaption>Photo: {}</figcaption>", escape(p)))
        .unwrap_or_default();
    format!(
        r#"<figure class="{} wp-block-image"><img src="{}" alt="{}" class="wp-image-{}"/>{}</figure>"#,
        FIGURE_CLASS,
        escape(url),
        escape(&image.alt),
        media_id,
        caption
    )
}

/// Inserts figure markup at each placement.
///
/// `after_intro` goes after the first paragraph, `after_h2` after the first
/// section heading, `before_conclusion` before the last section heading.
/// Figures whose anchor is missing are appended.
pub fn insert_figures(body: &str, figures: &[(Placement, String)]) -> String {
    if figures.is_empty() {
        return body.to_string();
    }

    let lower = body.to_ascii_lowercase();
    let after_intro = lower.find("</p>").map(|i| i + "</p>".len());
    let after_h2 = lower.find("</h2>").map(|i| i + "</h2>".len());
    let before_conclusion = lower.rfind("<h2");

    let mut inserts: Vec<(usize, &str)> = figures
        .iter()
        .map(|(placement, html)| {
            let anchor = match placement {
                Placement::AfterIntro => after_intro,
                Placement::AfterH2 => after_h2,
                Placement::BeforeConclusion => before_conclusion,
            };
            (anchor.unwrap_or(body.len()), html.as_str())
        })
        .collect();
    inserts.sort_by_key(|(pos, _)| *pos);

    let mut out = String::with_capacity(body.len() + figures.iter().map(|(_, h)| h.len() + 1).sum::<usize>());
    let mut cursor = 0;
    for (pos, html) in inserts {
        out.push_str(&body[cursor..pos]);
        out.push('\n');
        out.push_str(html);
        out.push('\n');
        cursor = pos;
    }
    out.push_str(&body[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::SourceItem;
    use crate::error::FetchError;
    use crate::hosting::{
        FetchedMedia, MediaRef, MediaTransport, MediaUpload, PostFilters, PostRef, PublishedPost,
    };
    use crate::pipeline::context::GeneratedContent;
    use crate::campaign::ImageSource;
    use crate::error::ProviderError;
    use crate::providers::{
        CapabilityHandler, FallbackInvoker, HandlerKind, HandlerResponse, InvokePayload,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockHost {
        drafts: Mutex<Vec<PostDraft>>,
        uploads: Mutex<Vec<String>>,
        provisioned: Mutex<Vec<String>>,
        updates: Mutex<Vec<(u64, PostUpdate)>>,
        published: Option<PublishedPost>,
        reject_uploads: bool,
    }

    #[async_trait]
    impl ArticleHost for MockHost {
        async fn create_post(&self, _site: &str, draft: &PostDraft) -> Result<PostRef, HostError> {
            self.drafts.lock().expect("lock").push(draft.clone());
            Ok(PostRef {
                id: 500,
                link: "https://blog.example.com/?p=500".to_string(),
            })
        }

        async fn upload_media(&self, _site: &str, upload: MediaUpload) -> Result<MediaRef, HostError> {
            if self.reject_uploads {
                return Err(HostError::UploadRejected("too large".to_string()));
            }
            let mut uploads = self.uploads.lock().expect("lock");
            uploads.push(upload.filename.clone());
            let id = 900 + uploads.len() as u64;
            Ok(MediaRef {
                id,
                url: format!("https://blog.example.com/media/{}", upload.filename),
            })
        }

        async fn update_post(&self, _site: &str, id: u64, update: &PostUpdate) -> Result<PostRef, HostError> {
            self.updates.lock().expect("lock").push((id, update.clone()));
            Ok(PostRef {
                id,
                link: format!("https://blog.example.com/?p={}", id),
            })
        }

        async fn get_post(&self, _site: &str, id: u64) -> Result<PublishedPost, HostError> {
            self.published
                .clone()
                .filter(|p| p.id == id)
                .ok_or(HostError::PostNotFound(id))
        }

        async fn get_posts(&self, _site: &str, _filters: &PostFilters) -> Result<Vec<PublishedPost>, HostError> {
            Ok(Vec::new())
        }

        async fn provision_author(&self, _site: &str, profile: &AuthorProfile) -> Result<u64, HostError> {
            self.provisioned.lock().expect("lock").push(profile.key.clone());
            Ok(77)
        }
    }

    struct MockTransport;

    #[async_trait]
    impl MediaTransport for MockTransport {
        async fn get(&self, url: &str) -> Result<FetchedMedia, FetchError> {
            if url.contains("missing") {
                return Err(FetchError::NotFound(url.to_string()));
            }
            Ok(FetchedMedia {
                bytes: vec![1, 2, 3],
                content_type: Some("image/png".to_string()),
            })
        }
    }

    #[derive(Default)]
    struct MockImages {
        counter: AtomicUsize,
    }

    #[async_trait]
    impl CapabilityHandler for MockImages {
        fn kind(&self) -> HandlerKind {
            HandlerKind::Flux
        }

        async fn invoke(
            &self,
            _capability: Capability,
            _payload: &InvokePayload,
        ) -> Result<HandlerResponse, ProviderError> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerResponse::new(format!("https://img.example.com/gen-{}.png", n)))
        }
    }

    fn publisher_with(host: Arc<MockHost>, invoker: FallbackInvoker) -> Publisher {
        let fetcher = MediaFetcher::new(Arc::new(MockTransport))
            .with_direct_hosts(Vec::new())
            .with_backoff(std::time::Duration::ZERO, 1);
        Publisher::new(
            host,
            Arc::new(fetcher),
            Arc::new(ImageAcquirer::new(Arc::new(invoker))),
        )
    }

    fn publisher(host: Arc<MockHost>) -> Publisher {
        publisher_with(host, FallbackInvoker::new())
    }

    fn published_post(content: &str, featured_media: Option<u64>) -> PublishedPost {
        PublishedPost {
            id: 31,
            link: "https://blog.example.com/?p=31".to_string(),
            title: "Budget &amp; Travel".to_string(),
            content: content.to_string(),
            slug: "budget-travel".to_string(),
            featured_media,
            ..PublishedPost::default()
        }
    }

    fn repair_campaign() -> Campaign {
        let mut campaign = Campaign::new("c1", "s1");
        campaign.images.sources = vec![ImageSource::Ai];
        campaign.images.inline_count = 1;
        campaign
    }

    fn image(slot: ImageSlot, url: &str) -> AcquiredImage {
        AcquiredImage {
            slot,
            url: url.to_string(),
            alt: "alt text".to_string(),
            source: "unsplash".to_string(),
            photographer: Some("Ana".to_string()),
            score: None,
        }
    }

    fn ready_ctx() -> RunContext {
        let mut ctx = RunContext::new("c1", "s1", SourceItem::new("Budget travel"));
        ctx.content = Some(GeneratedContent {
            title: "Budget Travel".to_string(),
            body: "<p>Intro.</p><h2>Plan</h2><p>Body.</p><h2>Conclusion</h2><p>End.</p>".to_string(),
            excerpt: "Travel for less.".to_string(),
            slug: "budget-travel".to_string(),
            used_fallback_title: false,
            handler_used: HandlerKind::Anthropic,
        });
        ctx
    }

    #[test]
    fn test_insert_figures_at_placements() {
        let body = "<p>Intro.</p><h2>Plan</h2><p>Body.</p><h2>End</h2><p>Bye.</p>";
        let out = insert_figures(
            body,
            &[
                (Placement::AfterIntro, "[A]".to_string()),
                (Placement::AfterH2, "[B]".to_string()),
                (Placement::BeforeConclusion, "[C]".to_string()),
            ],
        );
        assert_eq!(
            out,
            "<p>Intro.</p>\n[A]\n<h2>Plan</h2>\n[B]\n<p>Body.</p>\n[C]\n<h2>End</h2><p>Bye.</p>"
        );
    }

    #[test]
    fn test_insert_figures_appends_without_anchor() {
        let out = insert_figures("plain text", &[(Placement::AfterH2, "[B]".to_string())]);
        assert_eq!(out, "plain text\n[B]\n");
    }

    #[tokio::test]
    async fn test_publish_uploads_and_skips_failed_fetch() {
        let host = Arc::new(MockHost::default());
        let publisher = publisher(Arc::clone(&host));

        let mut ctx = ready_ctx();
        ctx.images.place(image(ImageSlot::Cover, "https://cdn.example.com/cover.jpg"));
        ctx.images.place(image(
            ImageSlot::Inline {
                index: 1,
                placement: Placement::AfterIntro,
            },
            "https://cdn.example.com/missing.jpg",
        ));
        ctx.images.place(image(
            ImageSlot::Inline {
                index: 2,
                placement: Placement::AfterH2,
            },
            "https://cdn.example.com/two.jpg",
        ));

        let campaign = Campaign::new("c1", "s1");
        let result = publisher.publish(&campaign, &ctx).await.expect("publish");

        assert_eq!(result.post_id, 500);
        assert_eq!(result.featured_media, Some(901));
        assert_eq!(result.inline_uploaded, 1);
        assert_eq!(result.failed_uploads.len(), 1);
        assert_eq!(result.failed_uploads[0].slot, "inline-1");
        assert_eq!(result.warnings.len(), 1);

        let drafts = host.drafts.lock().expect("lock");
        assert_eq!(drafts[0].featured_media, Some(901));
        assert!(drafts[0].content.contains("wp-image-902"));
        assert!(drafts[0].content.contains("<figcaption>Photo: Ana</figcaption>"));
        assert_eq!(
            *host.uploads.lock().expect("lock"),
            vec!["budget-travel-cover.png", "budget-travel-inline-2.png"]
        );
    }

    #[tokio::test]
    async fn test_author_mapping_beats_provisioning() {
        let host = Arc::new(MockHost::default());
        let publisher = publisher(Arc::clone(&host));

        let profile = AuthorProfile {
            key: "ana".to_string(),
            name: "Ana".to_string(),
            bio: None,
            email: None,
            expertise: vec!["travel".to_string()],
        };

        let mut campaign = Campaign::new("c1", "s1");
        campaign.authors.default_author_id = Some(1);
        campaign.authors.auto_provision = true;
        campaign.authors.mappings.insert("ana".to_string(), 42);

        let mut ctx = ready_ctx();
        ctx.matched_author = Some(profile.clone());
        let mapped = publisher.publish(&campaign, &ctx).await.expect("publish");
        assert_eq!(mapped.author, Some(42));
        assert!(host.provisioned.lock().expect("lock").is_empty());

        campaign.authors.mappings.clear();
        let provisioned = publisher.publish(&campaign, &ctx).await.expect("publish");
        assert_eq!(provisioned.author, Some(77));

        campaign.authors.auto_provision = false;
        let defaulted = publisher.publish(&campaign, &ctx).await.expect("publish");
        assert_eq!(defaulted.author, Some(1));
    }

    #[tokio::test]
    async fn test_upload_rejection_is_not_fatal() {
        let host = Arc::new(MockHost {
            reject_uploads: true,
            ..MockHost::default()
        });
        let publisher = publisher(Arc::clone(&host));
        let mut ctx = ready_ctx();
        ctx.images.place(image(ImageSlot::Cover, "https://cdn.example.com/cover.jpg"));

        let result = publisher
            .publish(&Campaign::new("c1", "s1"), &ctx)
            .await
            .expect("publish");
        assert_eq!(result.featured_media, None);
        assert_eq!(result.failed_uploads[0].slot, "cover");
    }

    #[tokio::test]
    async fn test_repair_reuploads_missing_images() {
        let host = Arc::new(MockHost {
            published: Some(published_post(
                r#"<p>Intro.</p><img src="" alt="lost"><h2>Plan</h2><p>Body.</p>"#,
                None,
            )),
            ..MockHost::default()
        });
        let publisher = publisher_with(
            Arc::clone(&host),
            FallbackInvoker::new().with_handler(Arc::new(MockImages::default())),
        );

        let report = publisher
            .repair_images(&repair_campaign(), 31)
            .await
            .expect("repair");

        assert!(report.repaired);
        assert_eq!(report.featured_media, Some(901));
        assert_eq!(report.inline_inserted, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            *host.uploads.lock().expect("lock"),
            vec!["budget-travel-cover.png", "budget-travel-inline-1.png"]
        );

        let updates = host.updates.lock().expect("lock");
        assert_eq!(updates.len(), 1);
        let (id, update) = &updates[0];
        assert_eq!(*id, 31);
        assert_eq!(update.featured_media, Some(901));
        let content = update.content.as_deref().expect("content updated");
        assert!(content.contains("wp-image-902"));
        assert!(!content.contains("alt=\"lost\""));
    }

    #[tokio::test]
    async fn test_repair_leaves_intact_post_unchanged() {
        let host = Arc::new(MockHost {
            published: Some(published_post(
                r#"<p>Intro.</p><img src="https://blog.example.com/media/a.png" alt="ok">"#,
                Some(55),
            )),
            ..MockHost::default()
        });
        let publisher = publisher_with(
            Arc::clone(&host),
            FallbackInvoker::new().with_handler(Arc::new(MockImages::default())),
        );

        let report = publisher
            .repair_images(&repair_campaign(), 31)
            .await
            .expect("repair");

        assert!(!report.repaired);
        assert_eq!(report.featured_media, Some(55));
        assert!(host.uploads.lock().expect("lock").is_empty());
        assert!(host.updates.lock().expect("lock").is_empty());
    }

    #[test]
    fn test_broken_image_detection() {
        assert!(has_broken_images(r#"<img alt="x">"#));
        assert!(has_broken_images(r#"<img src=" " alt="x">"#));
        assert!(!has_broken_images(r#"<IMG SRC='https://a.example.com/x.png'>"#));
        assert_eq!(
            remove_broken_images(r#"<p>a<img src=""></p><img src="https://a/x.png">"#),
            r#"<p>a</p><img src="https://a/x.png">"#
        );
    }

    #[tokio::test]
    async fn test_publish_without_content_fails() {
        let host = Arc::new(MockHost::default());
        let ctx = RunContext::new("c1", "s1", SourceItem::new("t"));
        let err = publisher(host)
            .publish(&Campaign::new("c1", "s1"), &ctx)
            .await
            .expect_err("no content");
        assert!(matches!(err, PublishError::NoContent));
    }
}

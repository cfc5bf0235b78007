//! Media fetching for re-upload.
//!
//! - `data:` URLs are decoded locally
//! - Known CORS-friendly hosts are fetched directly, once
//! - Everything else goes through the proxy template with exponential
//!   backoff on not-found and transient errors

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;

use super::MediaUpload;
use crate::config::AppConfig;
use crate::error::FetchError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw bytes of a fetched image.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedMedia {
    /// MIME type, defaulting to JPEG.
    pub fn mime_type(&self) -> &str {
        self.content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or("image/jpeg")
    }

    /// Builds an upload named after a slug.
    pub fn into_upload(self, base_name: &str, alt_text: Option<String>) -> MediaUpload {
        let mime_type = self.mime_type().to_string();
        let extension = match mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "jpg",
        };
        MediaUpload {
            filename: format!("{}.{}", base_name, extension),
            mime_type,
            bytes: self.bytes,
            alt_text,
            caption: None,
        }
    }
}

/// Low-level HTTP GET for media.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedMedia, FetchError>;
}

/// reqwest-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<FetchedMedia, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        Ok(FetchedMedia {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Fetches image bytes, choosing between direct and proxied paths.
pub struct MediaFetcher {
    transport: Arc<dyn MediaTransport>,
    direct_hosts: Vec<String>,
    proxy_template: Option<String>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl MediaFetcher {
    pub fn new(transport: Arc<dyn MediaTransport>) -> Self {
        let defaults = AppConfig::default();
        Self {
            transport,
            direct_hosts: defaults.media_direct_hosts,
            proxy_template: None,
            max_attempts: defaults.media_fetch_attempts,
            backoff_base: defaults.media_backoff_base,
        }
    }

    /// Builds a fetcher from process configuration.
    pub fn from_config(transport: Arc<dyn MediaTransport>, config: &AppConfig) -> Self {
        Self {
            transport,
            direct_hosts: config.media_direct_hosts.clone(),
            proxy_template: config.media_proxy_url.clone(),
            max_attempts: config.media_fetch_attempts.max(1),
            backoff_base: config.media_backoff_base,
        }
    }

    pub fn with_proxy(mut self, template: impl Into<String>) -> Self {
        self.proxy_template = Some(template.into());
        self
    }

    pub fn with_direct_hosts(mut self, hosts: Vec<String>) -> Self {
        self.direct_hosts = hosts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max_attempts: u32) -> Self {
        self.backoff_base = base;
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Fetches a media URL.
    ///
    /// # Errors
    ///
    /// Returns the last `FetchError` once every attempt is spent.
    pub async fn fetch(&self, url: &str) -> Result<FetchedMedia, FetchError> {
        if let Some(rest) = url.strip_prefix("data:") {
            return decode_data_url(rest);
        }

        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let host = parsed.host_str().unwrap_or_default().to_lowercase();

        if self.is_direct(&host) {
            tracing::debug!(url = %url, "Fetching media directly");
            return self.transport.get(url).await;
        }

        let target = match self.proxy_template {
            Some(ref template) => template.replace("{url}", &urlencoding::encode(url)),
            None => url.to_string(),
        };

        let mut attempt = 1;
        loop {
            match self.transport.get(&target).await {
                Ok(media) => return Ok(media),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        url = %url,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Media fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(url = %url, attempts = attempt, error = %e, "Media fetch gave up");
                    return Err(e);
                }
            }
        }
    }

    fn is_direct(&self, host: &str) -> bool {
        self.direct_hosts
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{}", d)))
    }
}

fn decode_data_url(rest: &str) -> Result<FetchedMedia, FetchError> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidPayload("data URL without payload".to_string()))?;

    let Some(mime) = header.strip_suffix(";base64") else {
        return Err(FetchError::InvalidPayload(
            "only base64 data URLs are supported".to_string(),
        ));
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| FetchError::InvalidPayload(e.to_string()))?;

    Ok(FetchedMedia {
        bytes,
        content_type: Some(mime.to_string()).filter(|m| !m.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transport that fails a fixed number of times before succeeding.
    struct MockTransport {
        failures_before_success: usize,
        error: fn(&str) -> FetchError,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new(failures_before_success: usize, error: fn(&str) -> FetchError) -> Self {
            Self {
                failures_before_success,
                error,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock poisoned").clone()
        }
    }

    #[async_trait]
    impl MediaTransport for MockTransport {
        async fn get(&self, url: &str) -> Result<FetchedMedia, FetchError> {
            let mut calls = self.calls.lock().expect("lock poisoned");
            calls.push(url.to_string());
            if calls.len() <= self.failures_before_success {
                return Err((self.error)(url));
            }
            Ok(FetchedMedia {
                bytes: vec![1, 2, 3],
                content_type: Some("image/png".to_string()),
            })
        }
    }

    fn not_found(url: &str) -> FetchError {
        FetchError::NotFound(url.to_string())
    }

    fn forbidden(url: &str) -> FetchError {
        FetchError::Status {
            status: 403,
            url: url.to_string(),
        }
    }

    fn fetcher(transport: Arc<MockTransport>) -> MediaFetcher {
        MediaFetcher::new(transport)
            .with_direct_hosts(vec!["images.unsplash.com".to_string()])
            .with_proxy("https://proxy.local/fetch?u={url}")
            .with_backoff(Duration::from_millis(1), 3)
    }

    #[tokio::test]
    async fn test_data_url_decoded_locally() {
        let transport = Arc::new(MockTransport::new(0, not_found));
        let media = fetcher(Arc::clone(&transport))
            .fetch("data:image/png;base64,AQID")
            .await
            .expect("decode");

        assert_eq!(media.bytes, vec![1, 2, 3]);
        assert_eq!(media.mime_type(), "image/png");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_direct_host_single_attempt() {
        let transport = Arc::new(MockTransport::new(5, not_found));
        let result = fetcher(Arc::clone(&transport))
            .fetch("https://images.unsplash.com/photo-1")
            .await;

        assert!(result.is_err());
        assert_eq!(transport.calls(), vec!["https://images.unsplash.com/photo-1"]);
    }

    #[tokio::test]
    async fn test_proxied_fetch_retries_then_succeeds() {
        let transport = Arc::new(MockTransport::new(2, not_found));
        let media = fetcher(Arc::clone(&transport))
            .fetch("https://cdn.example.com/a b.png")
            .await
            .expect("third attempt succeeds");

        assert_eq!(media.bytes, vec![1, 2, 3]);
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            "https://proxy.local/fetch?u=https%3A%2F%2Fcdn.example.com%2Fa%20b.png"
        );
    }

    #[tokio::test]
    async fn test_proxied_fetch_gives_up_after_max_attempts() {
        let transport = Arc::new(MockTransport::new(10, not_found));
        let err = fetcher(Arc::clone(&transport))
            .fetch("https://cdn.example.com/x.png")
            .await
            .expect_err("exhausted");

        assert!(matches!(err, FetchError::NotFound(_)));
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let transport = Arc::new(MockTransport::new(10, forbidden));
        let result = fetcher(Arc::clone(&transport))
            .fetch("https://cdn.example.com/x.png")
            .await;

        assert!(result.is_err());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let transport = Arc::new(MockTransport::new(0, not_found));
        let err = fetcher(transport)
            .fetch("ftp://example.com/x.png")
            .await
            .expect_err("invalid");
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn test_into_upload_extension() {
        let media = FetchedMedia {
            bytes: vec![0],
            content_type: Some("image/webp; charset=binary".to_string()),
        };
        let upload = media.into_upload("my-post-cover", Some("alt".to_string()));
        assert_eq!(upload.filename, "my-post-cover.webp");
        assert_eq!(upload.mime_type, "image/webp");
    }
}

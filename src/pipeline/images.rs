//! Image acquisition stage.
//!
//! One [`ImageAcquirer`] serves both strategies:
//!
//! - `SequentialFallback` fills each slot in turn, trying every source
//!   category in preference order.
//! - `ParallelRank` fans out AI generation and every stock search at once,
//!   bounded by an overall deadline, then scores and ranks the pooled
//!   candidates.
//!
//! Neither strategy fails the run: unfilled slots are reported in
//! [`GeneratedImages::failures`].

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::context::{AcquiredImage, GeneratedImages, ImageSlot};
use crate::campaign::{ImageSettings, ImageSource, ImageStrategy, MAX_INLINE_IMAGES};
use crate::error::ProviderError;
use crate::prompts::build_image_prompt;
use crate::providers::{Capability, FallbackInvoker, HandlerKind, InvokePayload};

/// Concurrent image generations during a parallel fan-out.
const MAX_PARALLEL_GENERATIONS: usize = 3;

const BASE_SCORE: u32 = 50;
const WIDE_BONUS: u32 = 15;
const FULL_HD_BONUS: u32 = 10;
const TOPIC_WORD_BONUS: u32 = 5;
const CREDIT_BONUS: u32 = 5;

/// An image offered by a source, before it is assigned to a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Alt text or description supplied by the source.
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub photographer: Option<String>,
    /// Name of the source that supplied the candidate.
    pub source: String,
}

/// A stock photo library.
#[async_trait]
pub trait StockImageSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, count: usize)
        -> Result<Vec<ImageCandidate>, ProviderError>;
}

/// Scores a candidate for a topic, 0-100.
///
/// Base 50, +15 at width 1200 or more and a further +10 at 1920 or more,
/// +5 per distinct topic word (three characters or longer) found in the alt
/// text, +5 when a photographer is credited.
pub fn score_candidate(candidate: &ImageCandidate, topic: &str) -> u32 {
    let mut score = BASE_SCORE;

    if let Some(width) = candidate.width {
        if width >= 1200 {
            score += WIDE_BONUS;
        }
        if width >= 1920 {
            score += FULL_HD_BONUS;
        }
    }

    let alt = candidate.alt.to_lowercase();
    let words: HashSet<String> = topic
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect();
    let matched = words.iter().filter(|w| alt.contains(w.as_str())).count() as u32;
    score += matched * TOPIC_WORD_BONUS;

    if candidate
        .photographer
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty())
    {
        score += CREDIT_BONUS;
    }

    score.min(100)
}

fn usable_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("https://") || url.starts_with("http://") || url.starts_with("data:image/"))
        && !url.contains(char::is_whitespace)
}

/// Result of one fan-out branch.
enum Fanout {
    Generated(Result<ImageCandidate, String>),
    Stock {
        provider: String,
        result: Result<Vec<ImageCandidate>, String>,
    },
}

/// Fills image slots from AI generation and stock libraries.
pub struct ImageAcquirer {
    invoker: Arc<FallbackInvoker>,
    stock: Vec<Arc<dyn StockImageSearch>>,
    fanout_timeout: Duration,
}

impl ImageAcquirer {
    pub fn new(invoker: Arc<FallbackInvoker>) -> Self {
        Self {
            invoker,
            stock: Vec::new(),
            fanout_timeout: Duration::from_secs(45),
        }
    }

    /// Registers a stock library; libraries are tried in registration order.
    pub fn with_stock(mut self, search: Arc<dyn StockImageSearch>) -> Self {
        self.stock.push(search);
        self
    }

    pub fn has_stock_libraries(&self) -> bool {
        !self.stock.is_empty()
    }

    pub fn with_fanout_timeout(mut self, timeout: Duration) -> Self {
        self.fanout_timeout = timeout;
        self
    }

    /// Acquires images for every planned slot.
    pub async fn acquire(
        &self,
        topic: &str,
        settings: &ImageSettings,
        preferred: &[HandlerKind],
    ) -> GeneratedImages {
        let slots = ImageSlot::plan(
            settings.cover,
            settings.inline_count.min(MAX_INLINE_IMAGES),
        );
        if slots.is_empty() {
            return GeneratedImages::default();
        }

        let images = match settings.strategy {
            ImageStrategy::SequentialFallback => {
                self.sequential(topic, &slots, &settings.sources, preferred)
                    .await
            }
            ImageStrategy::ParallelRank => {
                let timeout = settings
                    .fanout_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.fanout_timeout);
                self.parallel(topic, &slots, &settings.sources, preferred, timeout)
                    .await
            }
        };

        tracing::info!(
            topic = topic,
            strategy = ?settings.strategy,
            filled = images.inline.len() + usize::from(images.cover.is_some()),
            failed = images.failures.len(),
            "Image acquisition finished"
        );
        images
    }

    async fn generate(
        &self,
        topic: &str,
        slot: ImageSlot,
        preferred: &[HandlerKind],
    ) -> Result<ImageCandidate, String> {
        let prompt = build_image_prompt(topic, slot).map_err(|e| e.to_string())?;
        let outcome = self
            .invoker
            .invoke(Capability::GenerateImage, &InvokePayload::new(prompt), preferred)
            .await
            .map_err(|e| e.to_string())?;

        let url = outcome.text.trim().to_string();
        if !usable_url(&url) {
            return Err(format!(
                "{} returned an unusable image reference",
                outcome.handler_used
            ));
        }

        Ok(ImageCandidate {
            url,
            width: None,
            height: None,
            alt: topic.to_string(),
            photographer: None,
            source: outcome.handler_used.as_str().to_string(),
        })
    }

    async fn sequential(
        &self,
        topic: &str,
        slots: &[ImageSlot],
        sources: &[ImageSource],
        preferred: &[HandlerKind],
    ) -> GeneratedImages {
        let mut images = GeneratedImages::default();
        let mut used: HashSet<String> = HashSet::new();
        // One search per library, shared across slots.
        let mut stock_results: HashMap<usize, Result<Vec<ImageCandidate>, String>> =
            HashMap::new();

        for &slot in slots {
            let mut reasons: Vec<String> = Vec::new();
            let mut chosen: Option<(ImageCandidate, Option<u32>)> = None;

            'sources: for source in sources {
                match source {
                    ImageSource::Ai => {
                        if !self.invoker.can_serve(Capability::GenerateImage) {
                            reasons.push("ai: no image handlers registered".to_string());
                            continue;
                        }
                        match self.generate(topic, slot, preferred).await {
                            Ok(candidate) if !used.contains(&candidate.url) => {
                                chosen = Some((candidate, None));
                                break 'sources;
                            }
                            Ok(candidate) => {
                                reasons.push(format!("ai: duplicate image {}", candidate.url))
                            }
                            Err(e) => reasons.push(format!("ai: {}", e)),
                        }
                    }
                    ImageSource::Stock => {
                        if self.stock.is_empty() {
                            reasons.push("stock: no libraries registered".to_string());
                            continue;
                        }
                        for (idx, library) in self.stock.iter().enumerate() {
                            if !stock_results.contains_key(&idx) {
                                let result = library
                                    .search(topic, slots.len())
                                    .await
                                    .map_err(|e| e.to_string());
                                stock_results.insert(idx, result);
                            }
                            match stock_results.get(&idx) {
                                Some(Ok(found)) => {
                                    let fresh = found
                                        .iter()
                                        .find(|c| usable_url(&c.url) && !used.contains(&c.url));
                                    if let Some(candidate) = fresh {
                                        let score = score_candidate(candidate, topic);
                                        chosen = Some((candidate.clone(), Some(score)));
                                        break 'sources;
                                    }
                                    reasons.push(format!("{}: no unused results", library.name()));
                                }
                                Some(Err(e)) => reasons.push(format!("{}: {}", library.name(), e)),
                                None => {}
                            }
                        }
                    }
                }
            }

            match chosen {
                Some((candidate, score)) => {
                    used.insert(candidate.url.clone());
                    images.place(acquired(slot, candidate, score, topic));
                }
                None => {
                    let reason = if reasons.is_empty() {
                        "no image sources configured".to_string()
                    } else {
                        reasons.join("; ")
                    };
                    tracing::warn!(topic = topic, slot = %slot, reason = %reason, "Image slot unfilled");
                    images.fail(slot, reason);
                }
            }
        }

        images
    }

    async fn parallel(
        &self,
        topic: &str,
        slots: &[ImageSlot],
        sources: &[ImageSource],
        preferred: &[HandlerKind],
        timeout: Duration,
    ) -> GeneratedImages {
        let permits = Arc::new(Semaphore::new(MAX_PARALLEL_GENERATIONS));
        let mut branches: FuturesUnordered<BoxFuture<'_, Fanout>> = FuturesUnordered::new();
        let mut errors: Vec<String> = Vec::new();

        if sources.contains(&ImageSource::Ai) {
            if self.invoker.can_serve(Capability::GenerateImage) {
                for &slot in slots {
                    let permits = Arc::clone(&permits);
                    branches.push(
                        async move {
                            let _permit = match permits.acquire_owned().await {
                                Ok(permit) => permit,
                                Err(e) => return Fanout::Generated(Err(e.to_string())),
                            };
                            Fanout::Generated(self.generate(topic, slot, preferred).await)
                        }
                        .boxed(),
                    );
                }
            } else {
                errors.push("ai: no image handlers registered".to_string());
            }
        }

        if sources.contains(&ImageSource::Stock) {
            for library in &self.stock {
                let count = slots.len() * 2;
                branches.push(
                    async move {
                        Fanout::Stock {
                            provider: library.name().to_string(),
                            result: library
                                .search(topic, count)
                                .await
                                .map_err(|e| e.to_string()),
                        }
                    }
                    .boxed(),
                );
            }
        }

        let mut pool: Vec<ImageCandidate> = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, branches.next()).await {
                Ok(Some(Fanout::Generated(Ok(candidate)))) => pool.push(candidate),
                Ok(Some(Fanout::Generated(Err(e)))) => errors.push(format!("ai: {}", e)),
                Ok(Some(Fanout::Stock {
                    result: Ok(found), ..
                })) => pool.extend(found),
                Ok(Some(Fanout::Stock {
                    provider,
                    result: Err(e),
                })) => errors.push(format!("{}: {}", provider, e)),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            tracing::warn!(
                topic = topic,
                timeout_ms = timeout.as_millis() as u64,
                pending = branches.len(),
                collected = pool.len(),
                "Image fan-out timed out, continuing with collected candidates"
            );
            errors.push(format!(
                "fan-out timed out after {}ms",
                timeout.as_millis()
            ));
        }
        drop(branches);

        let mut seen = HashSet::new();
        let mut ranked: Vec<(u32, ImageCandidate)> = pool
            .into_iter()
            .filter(|c| usable_url(&c.url) && seen.insert(c.url.clone()))
            .map(|c| (score_candidate(&c, topic), c))
            .collect();
        ranked.sort_by_key(|(score, _)| Reverse(*score));

        let mut images = GeneratedImages::default();
        let mut ranked = ranked.into_iter();
        for &slot in slots {
            match ranked.next() {
                Some((score, candidate)) => {
                    images.place(acquired(slot, candidate, Some(score), topic))
                }
                None => {
                    let reason = if errors.is_empty() {
                        "not enough candidates".to_string()
                    } else {
                        format!("not enough candidates ({})", errors.join("; "))
                    };
                    images.fail(slot, reason);
                }
            }
        }

        images
    }
}

fn acquired(
    slot: ImageSlot,
    candidate: ImageCandidate,
    score: Option<u32>,
    topic: &str,
) -> AcquiredImage {
    let alt = if candidate.alt.trim().is_empty() {
        topic.to_string()
    } else {
        candidate.alt
    };
    AcquiredImage {
        slot,
        url: candidate.url,
        alt,
        source: candidate.source,
        photographer: candidate.photographer,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CapabilityHandler, HandlerResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockImageHandler {
        fail: bool,
        calls: AtomicUsize,
    }

    impl MockImageHandler {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CapabilityHandler for MockImageHandler {
        fn kind(&self) -> HandlerKind {
            HandlerKind::Flux
        }

        async fn invoke(
            &self,
            _capability: Capability,
            _payload: &InvokePayload,
        ) -> Result<HandlerResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::RequestFailed("flux offline".to_string()));
            }
            Ok(HandlerResponse::new(format!("https://img.example.com/ai-{}.png", n)))
        }
    }

    struct MockStock {
        name: &'static str,
        results: Vec<ImageCandidate>,
        delay: Duration,
    }

    #[async_trait]
    impl StockImageSearch for MockStock {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(
            &self,
            _query: &str,
            count: usize,
        ) -> Result<Vec<ImageCandidate>, ProviderError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.results.iter().take(count).cloned().collect())
        }
    }

    fn candidate(url: &str, width: u32, alt: &str, photographer: Option<&str>) -> ImageCandidate {
        ImageCandidate {
            url: url.to_string(),
            width: Some(width),
            height: None,
            alt: alt.to_string(),
            photographer: photographer.map(str::to_string),
            source: "unsplash".to_string(),
        }
    }

    fn settings(strategy: ImageStrategy, inline: usize) -> ImageSettings {
        ImageSettings {
            strategy,
            inline_count: inline,
            sources: vec![ImageSource::Ai, ImageSource::Stock],
            ..ImageSettings::default()
        }
    }

    #[test]
    fn test_score_candidate() {
        let topic = "Mountain hiking in Spain";
        assert_eq!(score_candidate(&candidate("u", 800, "", None), topic), 50);
        assert_eq!(score_candidate(&candidate("u", 1200, "", None), topic), 65);
        assert_eq!(score_candidate(&candidate("u", 1920, "", None), topic), 75);
        assert_eq!(
            score_candidate(
                &candidate("u", 1920, "Hiking a mountain trail in Spain, hiking", Some("Ana")),
                topic
            ),
            95
        );
        let mut many = candidate("u", 4000, "", Some("x"));
        many.alt = "alpha bravo charlie delta".to_string();
        assert_eq!(score_candidate(&many, "alpha bravo charlie delta"), 100);
    }

    #[tokio::test]
    async fn test_sequential_falls_back_to_stock() {
        let invoker = FallbackInvoker::new().with_handler(Arc::new(MockImageHandler::new(true)));
        let acquirer = ImageAcquirer::new(Arc::new(invoker)).with_stock(Arc::new(MockStock {
            name: "unsplash",
            results: vec![
                candidate("https://stock.example.com/1.jpg", 2000, "desk", None),
                candidate("https://stock.example.com/2.jpg", 1000, "desk", None),
            ],
            delay: Duration::ZERO,
        }));

        let images = acquirer
            .acquire("Home office", &settings(ImageStrategy::SequentialFallback, 1), &[])
            .await;

        let cover = images.cover.expect("cover filled");
        assert_eq!(cover.url, "https://stock.example.com/1.jpg");
        assert_eq!(images.inline.len(), 1);
        assert_eq!(images.inline[0].url, "https://stock.example.com/2.jpg");
        assert!(images.failures.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_reports_failed_slots() {
        let invoker = FallbackInvoker::new().with_handler(Arc::new(MockImageHandler::new(true)));
        let acquirer = ImageAcquirer::new(Arc::new(invoker)).with_stock(Arc::new(MockStock {
            name: "pexels",
            results: vec![candidate("https://stock.example.com/only.jpg", 1500, "", None)],
            delay: Duration::ZERO,
        }));

        let images = acquirer
            .acquire("Topic", &settings(ImageStrategy::SequentialFallback, 2), &[])
            .await;

        assert!(images.cover.is_some());
        assert_eq!(images.failed_slots(), vec!["inline-1", "inline-2"]);
        assert!(images.failures[0].reason.contains("flux offline"));
        assert!(images.failures[0].reason.contains("pexels: no unused results"));
    }

    #[tokio::test]
    async fn test_parallel_ranks_pool() {
        let invoker = FallbackInvoker::new().with_handler(Arc::new(MockImageHandler::new(false)));
        let acquirer = ImageAcquirer::new(Arc::new(invoker)).with_stock(Arc::new(MockStock {
            name: "unsplash",
            results: vec![
                candidate("https://stock.example.com/best.jpg", 2400, "garden tools", Some("Lee")),
                candidate("https://stock.example.com/best.jpg", 2400, "dup", None),
            ],
            delay: Duration::ZERO,
        }));

        let images = acquirer
            .acquire("Garden tools", &settings(ImageStrategy::ParallelRank, 2), &[])
            .await;

        let cover = images.cover.expect("cover");
        assert_eq!(cover.url, "https://stock.example.com/best.jpg");
        assert_eq!(cover.score, Some(90));
        assert_eq!(images.inline.len(), 2);
        assert!(images.inline.iter().all(|i| i.source == "flux"));
        assert!(images.failures.is_empty());
    }

    #[tokio::test]
    async fn test_parallel_timeout_degrades() {
        let invoker = FallbackInvoker::new().with_handler(Arc::new(MockImageHandler::new(false)));
        let acquirer = ImageAcquirer::new(Arc::new(invoker))
            .with_stock(Arc::new(MockStock {
                name: "slow",
                results: vec![candidate("https://stock.example.com/late.jpg", 3000, "", None)],
                delay: Duration::from_secs(30),
            }))
            .with_fanout_timeout(Duration::from_millis(100));

        let mut image_settings = settings(ImageStrategy::ParallelRank, 0);
        image_settings.cover = true;
        let images = acquirer.acquire("Topic", &image_settings, &[]).await;

        let cover = images.cover.expect("ai result kept");
        assert!(cover.url.starts_with("https://img.example.com/ai-"));
    }

    #[tokio::test]
    async fn test_parallel_with_no_sources_fails_every_slot() {
        let acquirer = ImageAcquirer::new(Arc::new(FallbackInvoker::new()));
        let images = acquirer
            .acquire("Topic", &settings(ImageStrategy::ParallelRank, 1), &[])
            .await;
        assert!(images.is_empty());
        assert_eq!(images.failed_slots(), vec!["cover", "inline-1"]);
    }
}

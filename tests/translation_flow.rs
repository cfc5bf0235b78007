//! Translation jobs against an in-process host and ledger.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use autopress::campaign::AuthorProfile;
use autopress::error::{HostError, ProviderError};
use autopress::hosting::{
    ArticleHost, MediaRef, MediaUpload, PostDraft, PostFilters, PostRef, PostUpdate,
    PublishedPost,
};
use autopress::ledger::{Ledger, MemoryLedger};
use autopress::providers::{
    Capability, CapabilityHandler, FallbackInvoker, HandlerKind, HandlerResponse, InvokePayload,
};
use autopress::translation::{
    TranslationJob, TranslationOutcome, TranslationPipeline, TranslationRecord, TranslationStatus,
};

struct Translator {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CapabilityHandler for Translator {
    fn kind(&self) -> HandlerKind {
        HandlerKind::OpenAi
    }

    async fn invoke(
        &self,
        _capability: Capability,
        payload: &InvokePayload,
    ) -> Result<HandlerResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let language = if payload.prompt.contains("to fr.") { "fr" } else { "es" };
        Ok(HandlerResponse::new(format!(
            "TITLE: Conseils [{}]\nEXCERPT: Court\n---\n<p>Voir <a href=\"https://blog.example.com/guide\">le guide</a>.</p>",
            language
        )))
    }
}

#[derive(Default)]
struct SourceHost {
    created: Mutex<Vec<(String, PostDraft)>>,
}

#[async_trait]
impl ArticleHost for SourceHost {
    async fn create_post(&self, site: &str, draft: &PostDraft) -> Result<PostRef, HostError> {
        let mut created = self.created.lock().expect("lock");
        created.push((site.to_string(), draft.clone()));
        let id = 500 + created.len() as u64;
        Ok(PostRef {
            id,
            link: format!("https://{}.example.com/?p={}", site, id),
        })
    }

    async fn upload_media(&self, _site: &str, _upload: MediaUpload) -> Result<MediaRef, HostError> {
        Err(HostError::UploadRejected("not used".to_string()))
    }

    async fn update_post(
        &self,
        _site: &str,
        id: u64,
        _update: &PostUpdate,
    ) -> Result<PostRef, HostError> {
        Err(HostError::PostNotFound(id))
    }

    async fn get_post(&self, _site: &str, id: u64) -> Result<PublishedPost, HostError> {
        Err(HostError::PostNotFound(id))
    }

    async fn get_posts(
        &self,
        _site: &str,
        _filters: &PostFilters,
    ) -> Result<Vec<PublishedPost>, HostError> {
        Ok(vec![PublishedPost {
            id: 42,
            link: "https://blog.example.com/saving-tips".to_string(),
            title: "Saving Tips".to_string(),
            content: "<p>See <a href=\"https://blog.example.com/guide\">the guide</a>.</p>"
                .to_string(),
            excerpt: "Short".to_string(),
            slug: "saving-tips".to_string(),
            status: "publish".to_string(),
            ..Default::default()
        }])
    }

    async fn provision_author(
        &self,
        _site: &str,
        _profile: &AuthorProfile,
    ) -> Result<u64, HostError> {
        Ok(1)
    }
}

fn job() -> TranslationJob {
    TranslationJob::from_yaml_str(
        r#"
id: sync
source_site_id: main
source_base_url: https://blog.example.com
targets:
  - site_id: s1
    language: es
    base_url: https://es.example.com
  - site_id: s1
    language: fr
    base_url: https://fr.example.com
providers: [openai]
"#,
    )
    .expect("valid job")
}

fn published_record(post_id: u64, language: &str, site: &str) -> TranslationRecord {
    let mut record = TranslationRecord::new("earlier", post_id, "main", language, site);
    record.status = TranslationStatus::Published;
    record.target_post_id = Some(9);
    record
}

#[tokio::test]
async fn test_published_triple_is_skipped_without_translating() {
    let calls = Arc::new(AtomicUsize::new(0));
    let invoker = Arc::new(FallbackInvoker::new().with_handler(Arc::new(Translator {
        calls: Arc::clone(&calls),
    })));
    let host = Arc::new(SourceHost::default());
    let ledger = Arc::new(MemoryLedger::new());
    ledger
        .append_translation(&published_record(42, "es", "s1"))
        .await
        .expect("seed");

    let pipeline = TranslationPipeline::new(invoker, host.clone(), ledger.clone());
    let report = pipeline.run_job(&job()).await.expect("job");

    assert_eq!(report.items.len(), 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.published, 1);
    assert_eq!(report.failed, 0);

    let es = report
        .items
        .iter()
        .find(|i| i.target_language == "es")
        .expect("es item");
    assert!(matches!(es.outcome, TranslationOutcome::Skipped { .. }));

    // Only the French target was translated and published.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let created = host.created.lock().expect("lock").clone();
    assert_eq!(created.len(), 1);
    let (site, draft) = &created[0];
    assert_eq!(site, "s1");
    assert_eq!(draft.title, "Conseils [fr]");
    assert_eq!(draft.slug, "conseils-fr");
    assert!(draft.content.starts_with("<div lang=\"fr\">"));
    assert!(draft.content.contains("https://fr.example.com/guide"));

    // The skip is not appended; the French publish is.
    let history = ledger.translation_history("main", 42).await.expect("history");
    assert_eq!(history.len(), 2);
    let fr = &history[1];
    assert_eq!(fr.target_language, "fr");
    assert_eq!(fr.status, TranslationStatus::Published);
    assert_eq!(fr.target_post_id, Some(501));
    assert!(fr.applied_postprocess.contains(&"rewrite_internal_links".to_string()));
    assert!(fr.applied_postprocess.contains(&"localize_slug".to_string()));
    assert!(fr.source_chars > 0);
}

#[tokio::test]
async fn test_rerunning_job_skips_everything() {
    let calls = Arc::new(AtomicUsize::new(0));
    let invoker = Arc::new(FallbackInvoker::new().with_handler(Arc::new(Translator {
        calls: Arc::clone(&calls),
    })));
    let host = Arc::new(SourceHost::default());
    let ledger = Arc::new(MemoryLedger::new());
    let pipeline = TranslationPipeline::new(invoker, host.clone(), ledger.clone());

    let first = pipeline.run_job(&job()).await.expect("first");
    assert_eq!(first.published, 2);

    let second = pipeline.run_job(&job()).await.expect("second");
    assert_eq!(second.skipped, 2);
    assert_eq!(second.published, 0);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(host.created.lock().expect("lock").len(), 2);
    assert_eq!(
        ledger.translation_history("main", 42).await.expect("history").len(),
        2
    );
}

#[tokio::test]
async fn test_failed_translation_is_recorded_with_stage() {
    let invoker = Arc::new(FallbackInvoker::new());
    let host = Arc::new(SourceHost::default());
    let ledger = Arc::new(MemoryLedger::new());
    let pipeline = TranslationPipeline::new(invoker, host.clone(), ledger.clone());

    let report = pipeline.run_job(&job()).await.expect("job");
    assert_eq!(report.failed, 2);
    assert!(report.items.iter().all(|i| matches!(
        i.outcome,
        TranslationOutcome::Failed {
            stage: TranslationStatus::Translating,
            ..
        }
    )));
    assert!(host.created.lock().expect("lock").is_empty());

    let history = ledger.translation_history("main", 42).await.expect("history");
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.status == TranslationStatus::Failed));
}

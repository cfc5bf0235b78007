//! In-memory ledger for tests and dry runs.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{is_already_generated, normalize_topic, GeneratedPostRecord, Ledger};
use crate::error::LedgerError;
use crate::translation::TranslationRecord;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    generated: Mutex<Vec<GeneratedPostRecord>>,
    translations: Mutex<Vec<TranslationRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every generated-post record.
    pub fn generated(&self) -> Vec<GeneratedPostRecord> {
        lock(&self.generated).clone()
    }

    /// Snapshot of every translation record.
    pub fn translations(&self) -> Vec<TranslationRecord> {
        lock(&self.translations).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn find_generated(
        &self,
        campaign_id: &str,
        target_site_id: &str,
        topic: &str,
    ) -> Result<Option<GeneratedPostRecord>, LedgerError> {
        let key = normalize_topic(topic);
        Ok(lock(&self.generated)
            .iter()
            .find(|r| {
                r.campaign_id == campaign_id
                    && r.target_site_id == target_site_id
                    && r.topic_key == key
            })
            .cloned())
    }

    async fn record_generated(&self, record: &GeneratedPostRecord) -> Result<bool, LedgerError> {
        let mut generated = lock(&self.generated);
        if is_already_generated(
            &generated,
            &record.campaign_id,
            &record.target_site_id,
            &record.topic,
        ) {
            return Ok(false);
        }
        generated.push(record.clone());
        Ok(true)
    }

    async fn generated_for_campaign(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<GeneratedPostRecord>, LedgerError> {
        Ok(lock(&self.generated)
            .iter()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn translation_history(
        &self,
        source_site_id: &str,
        source_post_id: u64,
    ) -> Result<Vec<TranslationRecord>, LedgerError> {
        Ok(lock(&self.translations)
            .iter()
            .filter(|r| r.source_site_id == source_site_id && r.source_post_id == source_post_id)
            .cloned()
            .collect())
    }

    async fn append_translation(&self, record: &TranslationRecord) -> Result<(), LedgerError> {
        lock(&self.translations).push(record.clone());
        Ok(())
    }
}

//! Durable dedup ledger and translation history.
//!
//! The [`Ledger`] trait is append-only: generated posts and translation
//! records are inserted, never updated. [`KeyedLocks`] serializes the
//! read-check-append sequence per logical key so concurrent workers cannot
//! both pass the same dedup check.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use crate::error::LedgerError;
use crate::translation::TranslationRecord;

/// One published article, keyed by (campaign, target site, normalized topic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPostRecord {
    pub campaign_id: String,
    pub target_site_id: String,
    pub topic_key: String,
    pub topic: String,
    pub post_id: u64,
    pub link: String,
    pub quality_score: Option<u32>,
    pub flagged: bool,
    pub created_at: DateTime<Utc>,
}

/// Append-only storage for generated posts and translation history.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Looks up the record for a topic, normalizing it first.
    async fn find_generated(
        &self,
        campaign_id: &str,
        target_site_id: &str,
        topic: &str,
    ) -> Result<Option<GeneratedPostRecord>, LedgerError>;

    /// Inserts a record. Returns false if the key was already present.
    async fn record_generated(&self, record: &GeneratedPostRecord) -> Result<bool, LedgerError>;

    async fn generated_for_campaign(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<GeneratedPostRecord>, LedgerError>;

    /// Full history for one source post, oldest first.
    async fn translation_history(
        &self,
        source_site_id: &str,
        source_post_id: u64,
    ) -> Result<Vec<TranslationRecord>, LedgerError>;

    async fn append_translation(&self, record: &TranslationRecord) -> Result<(), LedgerError>;
}

/// Lower-cases and collapses non-alphanumeric runs to a single space.
pub fn normalize_topic(topic: &str) -> String {
    let mut out = String::with_capacity(topic.len());
    let mut pending_space = false;
    for c in topic.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Whether any record covers the (campaign, site, topic) key.
pub fn is_already_generated(
    records: &[GeneratedPostRecord],
    campaign_id: &str,
    target_site_id: &str,
    topic: &str,
) -> bool {
    let key = normalize_topic(topic);
    records.iter().any(|r| {
        r.campaign_id == campaign_id && r.target_site_id == target_site_id && r.topic_key == key
    })
}

/// Whether a `published` record exists for the (post, language, site) triple.
pub fn is_already_translated(
    records: &[TranslationRecord],
    source_post_id: u64,
    language: &str,
    target_site_id: &str,
) -> bool {
    records
        .iter()
        .any(|r| r.covers(source_post_id, language, target_site_id))
}

/// Per-key async mutexes.
///
/// Entries are created on demand and kept for the life of the table; keys
/// are bounded by the number of work items in a batch.
#[derive(Debug, Default, Clone)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Key for a generated-post ledger entry.
    pub fn generated_key(campaign_id: &str, target_site_id: &str, topic: &str) -> String {
        format!(
            "gen:{}:{}:{}",
            campaign_id,
            target_site_id,
            normalize_topic(topic)
        )
    }

    /// Key for a translation triple.
    pub fn translation_key(source_post_id: u64, language: &str, target_site_id: &str) -> String {
        format!(
            "tr:{}:{}:{}",
            source_post_id,
            language.to_lowercase(),
            target_site_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::TranslationStatus;
    use std::time::Duration;

    fn record(topic: &str) -> GeneratedPostRecord {
        GeneratedPostRecord {
            campaign_id: "c1".to_string(),
            target_site_id: "s1".to_string(),
            topic_key: normalize_topic(topic),
            topic: topic.to_string(),
            post_id: 10,
            link: "https://x/p".to_string(),
            quality_score: Some(80),
            flagged: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_topic() {
        assert_eq!(normalize_topic("  Top 10 Budget-Tips!! "), "top 10 budget tips");
        assert_eq!(normalize_topic("Café & Crème"), "café crème");
        assert_eq!(normalize_topic("???"), "");
    }

    #[test]
    fn test_is_already_generated_normalizes() {
        let records = vec![record("Budget Tips")];
        assert!(is_already_generated(&records, "c1", "s1", "budget   tips!"));
        assert!(!is_already_generated(&records, "c2", "s1", "Budget Tips"));
        assert!(!is_already_generated(&records, "c1", "s2", "Budget Tips"));
    }

    #[test]
    fn test_is_already_translated() {
        let mut published = TranslationRecord::new("job", 42, "src", "es", "s1");
        published.status = TranslationStatus::Published;
        let mut failed = TranslationRecord::new("job", 42, "src", "fr", "s1");
        failed.status = TranslationStatus::Failed;
        let records = vec![published, failed];

        assert!(is_already_translated(&records, 42, "es", "s1"));
        assert!(!is_already_translated(&records, 42, "fr", "s1"));
        assert!(!is_already_translated(&records, 7, "es", "s1"));
    }

    #[tokio::test]
    async fn test_keyed_locks_serialize_same_key() {
        let locks = KeyedLocks::new();
        let guard = locks.acquire("k").await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire("k").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finishes")
            .expect("join");
    }

    #[tokio::test]
    async fn test_keyed_locks_independent_keys() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("a").await;
        tokio::time::timeout(Duration::from_millis(100), locks.acquire("b"))
            .await
            .expect("different key is not blocked");
    }
}

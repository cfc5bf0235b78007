//! Deduplication gate.
//!
//! Consulted before any model is invoked. The gate itself takes no lock;
//! callers that run items concurrently hold the key in
//! [`KeyedLocks`](crate::ledger::KeyedLocks) from this check until the
//! ledger write.

use crate::error::LedgerError;
use crate::ledger::{normalize_topic, Ledger};

/// Whether a topic should be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    Proceed,
    Skip { reason: String },
}

impl DedupDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, DedupDecision::Skip { .. })
    }
}

/// Checks topics against the generated-post ledger.
pub struct DedupGate<'a> {
    ledger: &'a dyn Ledger,
}

impl<'a> DedupGate<'a> {
    pub fn new(ledger: &'a dyn Ledger) -> Self {
        Self { ledger }
    }

    /// Decides whether `topic` was already produced for the campaign and site.
    pub async fn check(
        &self,
        topic: &str,
        campaign_id: &str,
        target_site_id: &str,
    ) -> Result<DedupDecision, LedgerError> {
        if normalize_topic(topic).is_empty() {
            return Ok(DedupDecision::Skip {
                reason: format!("topic '{}' is empty after normalization", topic),
            });
        }

        let existing = self
            .ledger
            .find_generated(campaign_id, target_site_id, topic)
            .await?;

        Ok(match existing {
            Some(record) => DedupDecision::Skip {
                reason: format!(
                    "topic '{}' already published for campaign '{}' on site '{}' as post {} ({})",
                    record.topic, campaign_id, target_site_id, record.post_id, record.link
                ),
            },
            None => DedupDecision::Proceed,
        })
    }
}

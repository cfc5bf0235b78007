//! SQLite-backed ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use super::{normalize_topic, GeneratedPostRecord, Ledger};
use crate::error::LedgerError;
use crate::translation::{TranslationRecord, TranslationStatus};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS generated_posts (
    campaign_id     TEXT    NOT NULL,
    target_site_id  TEXT    NOT NULL,
    topic_key       TEXT    NOT NULL,
    topic           TEXT    NOT NULL,
    post_id         INTEGER NOT NULL,
    link            TEXT    NOT NULL,
    quality_score   INTEGER,
    flagged         INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT    NOT NULL,

    PRIMARY KEY (campaign_id, target_site_id, topic_key)
);

CREATE TABLE IF NOT EXISTS translation_history (
    id                  TEXT    PRIMARY KEY,
    job_id              TEXT    NOT NULL,
    source_post_id      INTEGER NOT NULL,
    source_site_id      TEXT    NOT NULL,
    target_language     TEXT    NOT NULL,
    target_site_id      TEXT    NOT NULL,
    status              TEXT    NOT NULL,
    started_at          TEXT    NOT NULL,
    completed_at        TEXT,
    source_chars        INTEGER NOT NULL DEFAULT 0,
    applied_postprocess TEXT    NOT NULL DEFAULT '[]',
    target_post_id      INTEGER,
    target_link         TEXT,
    error               TEXT,
    failed_stage        TEXT,
    recorded_at         TEXT    NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_translation_source
    ON translation_history(source_site_id, source_post_id);
"#;

/// Ledger stored in a local SQLite database.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Opens (creating if missing) the ledger at `path` and applies the schema.
    pub async fn open(path: &str) -> Result<Self, LedgerError> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        tracing::info!(path = path, "Ledger opened");
        Ok(Self { pool })
    }

    /// Opens a private in-memory ledger.
    pub async fn open_in_memory() -> Result<Self, LedgerError> {
        // A single connection: every connection to :memory: is a separate database.
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::CorruptRow(format!("bad timestamp '{}': {}", value, e)))
}

fn generated_from_row(row: &SqliteRow) -> Result<GeneratedPostRecord, LedgerError> {
    let created_at: String = row.get("created_at");
    Ok(GeneratedPostRecord {
        campaign_id: row.get("campaign_id"),
        target_site_id: row.get("target_site_id"),
        topic_key: row.get("topic_key"),
        topic: row.get("topic"),
        post_id: row.get::<i64, _>("post_id") as u64,
        link: row.get("link"),
        quality_score: row.get::<Option<i64>, _>("quality_score").map(|v| v as u32),
        flagged: row.get::<i64, _>("flagged") != 0,
        created_at: parse_time(&created_at)?,
    })
}

fn translation_from_row(row: &SqliteRow) -> Result<TranslationRecord, LedgerError> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");
    let applied: String = row.get("applied_postprocess");
    let failed_stage: Option<String> = row.get("failed_stage");

    Ok(TranslationRecord {
        id: uuid::Uuid::parse_str(&id)
            .map_err(|e| LedgerError::CorruptRow(format!("bad id '{}': {}", id, e)))?,
        job_id: row.get("job_id"),
        source_post_id: row.get::<i64, _>("source_post_id") as u64,
        source_site_id: row.get("source_site_id"),
        target_language: row.get("target_language"),
        target_site_id: row.get("target_site_id"),
        status: TranslationStatus::from_str(&status).map_err(LedgerError::CorruptRow)?,
        started_at: parse_time(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_time).transpose()?,
        source_chars: row.get::<i64, _>("source_chars") as usize,
        applied_postprocess: serde_json::from_str(&applied)?,
        target_post_id: row.get::<Option<i64>, _>("target_post_id").map(|v| v as u64),
        target_link: row.get("target_link"),
        error: row.get("error"),
        failed_stage: failed_stage
            .as_deref()
            .map(TranslationStatus::from_str)
            .transpose()
            .map_err(LedgerError::CorruptRow)?,
    })
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn find_generated(
        &self,
        campaign_id: &str,
        target_site_id: &str,
        topic: &str,
    ) -> Result<Option<GeneratedPostRecord>, LedgerError> {
        let row = sqlx::query(
            "SELECT * FROM generated_posts
             WHERE campaign_id = ?1 AND target_site_id = ?2 AND topic_key = ?3",
        )
        .bind(campaign_id)
        .bind(target_site_id)
        .bind(normalize_topic(topic))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(generated_from_row).transpose()
    }

    async fn record_generated(&self, record: &GeneratedPostRecord) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO generated_posts (
                campaign_id, target_site_id, topic_key, topic, post_id, link,
                quality_score, flagged, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&record.campaign_id)
        .bind(&record.target_site_id)
        .bind(&record.topic_key)
        .bind(&record.topic)
        .bind(record.post_id as i64)
        .bind(&record.link)
        .bind(record.quality_score.map(|v| v as i64))
        .bind(record.flagged as i64)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn generated_for_campaign(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<GeneratedPostRecord>, LedgerError> {
        let rows = sqlx::query(
            "SELECT * FROM generated_posts WHERE campaign_id = ?1 ORDER BY created_at",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(generated_from_row).collect()
    }

    async fn translation_history(
        &self,
        source_site_id: &str,
        source_post_id: u64,
    ) -> Result<Vec<TranslationRecord>, LedgerError> {
        let rows = sqlx::query(
            "SELECT * FROM translation_history
             WHERE source_site_id = ?1 AND source_post_id = ?2
             ORDER BY started_at, rowid",
        )
        .bind(source_site_id)
        .bind(source_post_id as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(translation_from_row).collect()
    }

    async fn append_translation(&self, record: &TranslationRecord) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO translation_history (
                id, job_id, source_post_id, source_site_id, target_language,
                target_site_id, status, started_at, completed_at, source_chars,
                applied_postprocess, target_post_id, target_link, error, failed_stage
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        )
        .bind(record.id.to_string())
        .bind(&record.job_id)
        .bind(record.source_post_id as i64)
        .bind(&record.source_site_id)
        .bind(&record.target_language)
        .bind(&record.target_site_id)
        .bind(record.status.as_str())
        .bind(record.started_at.to_rfc3339())
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .bind(record.source_chars as i64)
        .bind(serde_json::to_string(&record.applied_postprocess)?)
        .bind(record.target_post_id.map(|v| v as i64))
        .bind(&record.target_link)
        .bind(&record.error)
        .bind(record.failed_stage.map(|s| s.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(topic: &str) -> GeneratedPostRecord {
        GeneratedPostRecord {
            campaign_id: "c1".to_string(),
            target_site_id: "s1".to_string(),
            topic_key: normalize_topic(topic),
            topic: topic.to_string(),
            post_id: 101,
            link: "https://blog.example.com/p".to_string(),
            quality_score: Some(82),
            flagged: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_find_generated() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("ledger.db");
        let ledger = SqliteLedger::open(path.to_str().expect("utf8 path"))
            .await
            .expect("open");

        assert!(ledger
            .find_generated("c1", "s1", "Budget Tips")
            .await
            .expect("query")
            .is_none());

        assert!(ledger.record_generated(&record("Budget Tips")).await.expect("insert"));

        let found = ledger
            .find_generated("c1", "s1", "budget tips!")
            .await
            .expect("query")
            .expect("present");
        assert_eq!(found.post_id, 101);
        assert_eq!(found.quality_score, Some(82));
        assert!(found.flagged);
    }

    #[tokio::test]
    async fn test_duplicate_insert_ignored() {
        let ledger = SqliteLedger::open_in_memory().await.expect("open");
        assert!(ledger.record_generated(&record("Topic")).await.expect("insert"));
        assert!(!ledger.record_generated(&record("topic")).await.expect("insert"));
        assert_eq!(
            ledger.generated_for_campaign("c1").await.expect("list").len(),
            1
        );
    }

    #[tokio::test]
    async fn test_translation_history_round_trip() {
        let ledger = SqliteLedger::open_in_memory().await.expect("open");

        let mut record = TranslationRecord::new("job", 42, "main", "es", "s1");
        record.source_chars = 1200;
        record.applied_postprocess = vec!["localize_slug".to_string()];
        record.status = TranslationStatus::Published;
        record.target_post_id = Some(9);
        record.completed_at = Some(Utc::now());
        ledger.append_translation(&record).await.expect("append");

        let mut failed = TranslationRecord::new("job", 42, "main", "fr", "s2");
        failed.fail("translate exploded");
        ledger.append_translation(&failed).await.expect("append");

        let history = ledger.translation_history("main", 42).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, record.id);
        assert_eq!(history[0].applied_postprocess, vec!["localize_slug"]);
        assert_eq!(history[1].failed_stage, Some(TranslationStatus::Pending));
        assert!(crate::ledger::is_already_translated(&history, 42, "es", "s1"));
        assert!(ledger
            .translation_history("main", 7)
            .await
            .expect("history")
            .is_empty());
    }
}

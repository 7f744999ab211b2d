//! Append-only history of past analyses.
//!
//! Entries are immutable once written: there is no update or delete, only
//! `append` and a newest-first `list`. Persistence is best effort — the
//! orchestrator logs and swallows append failures so a flaky database never
//! fails a user-visible response. A Postgres store backs production; the
//! in-memory store covers development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use medscan_pipeline::records::DocumentType;

/// One persisted analysis. Field names mirror the JSON the history endpoint
/// serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub ocr_text: String,
    pub summary: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        doc_type: DocumentType,
        ocr_text: String,
        summary: serde_json::Value,
        summary_text: Option<String>,
        language: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            doc_type,
            ocr_text,
            summary,
            summary_text,
            language,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: HistoryEntry) -> anyhow::Result<()>;
    /// Entries ordered newest-first, at most `limit`.
    async fn list(&self, limit: i64) -> anyhow::Result<Vec<HistoryEntry>>;
}

/// In-memory implementation of HistoryStore
pub struct InMemoryHistoryStore {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> anyhow::Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn list(&self, limit: i64) -> anyhow::Result<Vec<HistoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// Postgres implementation of HistoryStore
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Connect and ensure the history table exists.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history_entries (
                id UUID PRIMARY KEY,
                doc_type TEXT NOT NULL,
                ocr_text TEXT NOT NULL,
                summary JSONB NOT NULL,
                summary_text TEXT,
                language TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("connected to Postgres history store");
        Ok(Self { pool })
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO history_entries
                (id, doc_type, ocr_text, summary, summary_text, language, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.doc_type.as_str())
        .bind(&entry.ocr_text)
        .bind(&entry.summary)
        .bind(&entry.summary_text)
        .bind(&entry.language)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, limit: i64) -> anyhow::Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, doc_type, ocr_text, summary, summary_text, language, created_at
            FROM history_entries
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let doc_type: String = row.try_get("doc_type")?;
            entries.push(HistoryEntry {
                id: row.try_get("id")?,
                doc_type: match doc_type.as_str() {
                    "report" => DocumentType::Report,
                    _ => DocumentType::Prescription,
                },
                ocr_text: row.try_get("ocr_text")?,
                summary: row.try_get("summary")?,
                summary_text: row.try_get("summary_text")?,
                language: row.try_get("language")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(language: &str) -> HistoryEntry {
        HistoryEntry::new(
            DocumentType::Prescription,
            "ocr".to_string(),
            json!({"stage": "mild"}),
            None,
            language.to_string(),
        )
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let store = InMemoryHistoryStore::new();
        store.append(entry("en")).await.unwrap();
        store.append(entry("hi")).await.unwrap();
        store.append(entry("mr")).await.unwrap();

        let listed = store.list(100).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].language, "mr");
        assert_eq!(listed[2].language, "en");
    }

    #[tokio::test]
    async fn list_honors_limit() {
        let store = InMemoryHistoryStore::new();
        for _ in 0..5 {
            store.append(entry("en")).await.unwrap();
        }
        assert_eq!(store.list(2).await.unwrap().len(), 2);
    }

    #[test]
    fn entry_serializes_with_api_field_names() {
        let value = serde_json::to_value(entry("en")).unwrap();
        assert_eq!(value["type"], "prescription");
        assert!(value.get("ocrText").is_some());
        assert!(value.get("createdAt").is_some());
        // summary_text of None is omitted entirely.
        assert!(value.get("summaryText").is_none());
    }
}

//! libSQL backend: async `DraftStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::drafts::model::Draft;
use crate::error::{DatabaseError, DraftError};
use crate::store::migrations;
use crate::store::traits::DraftStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Draft database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format for storage (fixed width, sorts lexically).
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a Draft.
///
/// Column order matches DRAFT_COLUMNS.
fn row_to_draft(row: &libsql::Row) -> Result<Draft, libsql::Error> {
    let created_str: String = row.get(2)?;
    let updated_str: String = row.get(3)?;
    let edited: i64 = row.get(4)?;
    let category_str: Option<String> = row.get(7).ok();

    Ok(Draft {
        message_id: row.get(0)?,
        reply_text: row.get(1)?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
        edited: edited != 0,
        sender: row.get(5)?,
        subject: row.get(6)?,
        category: category_str.and_then(|s| s.parse().ok()),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const DRAFT_COLUMNS: &str =
    "message_id, reply_text, created_at, updated_at, edited, sender, subject, category";

#[async_trait]
impl DraftStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn save_draft(&self, draft: &Draft) -> Result<(), DraftError> {
        draft.validate()?;

        let now = format_datetime(&Utc::now());
        self.conn()
            .execute(
                "INSERT INTO drafts (message_id, reply_text, created_at, updated_at, edited, sender, subject, category)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(message_id) DO UPDATE SET
                    reply_text = excluded.reply_text,
                    updated_at = excluded.updated_at,
                    edited = excluded.edited,
                    sender = excluded.sender,
                    subject = excluded.subject,
                    category = excluded.category",
                params![
                    draft.message_id.as_str(),
                    draft.reply_text.as_str(),
                    format_datetime(&draft.created_at),
                    now,
                    draft.edited as i64,
                    draft.sender.as_str(),
                    draft.subject.as_str(),
                    opt_text(draft.category.map(|c| c.as_str())),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_draft: {e}")))?;

        debug!(message_id = %draft.message_id, edited = draft.edited, "Draft saved");
        Ok(())
    }

    async fn load_draft(&self, message_id: &str) -> Result<Option<Draft>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_draft: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_draft: {e}")))?
        {
            Some(row) => Ok(Some(
                row_to_draft(&row).map_err(|e| DatabaseError::Query(format!("load_draft: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    async fn list_drafts(&self) -> Result<Vec<Draft>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {DRAFT_COLUMNS} FROM drafts ORDER BY updated_at DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_drafts: {e}")))?;

        let mut drafts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_drafts: {e}")))?
        {
            drafts.push(
                row_to_draft(&row).map_err(|e| DatabaseError::Query(format!("list_drafts: {e}")))?,
            );
        }
        Ok(drafts)
    }

    async fn count_drafts(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM drafts", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_drafts: {e}")))?;

        let count: i64 = match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_drafts: {e}")))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("count_drafts: {e}")))?,
            None => 0,
        };
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::pipeline::types::{Category, InboundMessage};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_draft(id: &str, text: &str) -> Draft {
        let message = InboundMessage {
            id: id.into(),
            sender: "ops@example.com".into(),
            sender_name: None,
            subject: "URGENT: server down".into(),
            body: "Prod is down.".into(),
            received_at: Utc::now(),
        };
        Draft::for_message(&message, Category::Urgent, text)
    }

    #[tokio::test]
    async fn save_then_load_returns_text() {
        let db = test_db().await;
        db.save_draft(&make_draft("101", "On it.")).await.unwrap();

        let loaded = db.load_draft("101").await.unwrap().unwrap();
        assert_eq!(loaded.reply_text, "On it.");
        assert_eq!(loaded.sender, "ops@example.com");
        assert_eq!(loaded.subject, "URGENT: server down");
        assert_eq!(loaded.category, Some(Category::Urgent));
        assert!(!loaded.edited);
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let db = test_db().await;
        assert!(db.load_draft("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_save_overwrites() {
        let db = test_db().await;
        let mut draft = make_draft("101", "On it.");
        db.save_draft(&draft).await.unwrap();
        let first = db.load_draft("101").await.unwrap().unwrap();

        draft.edit("On it, calling you now.");
        db.save_draft(&draft).await.unwrap();

        assert_eq!(db.count_drafts().await.unwrap(), 1);
        let loaded = db.load_draft("101").await.unwrap().unwrap();
        assert_eq!(loaded.reply_text, "On it, calling you now.");
        assert!(loaded.edited);
        assert_eq!(loaded.created_at, first.created_at);
        assert!(loaded.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn overwrite_keeps_first_created_at() {
        let db = test_db().await;
        let original = make_draft("5", "First version.");
        db.save_draft(&original).await.unwrap();

        // A draft regenerated in a later session carries a newer created_at.
        let mut later = make_draft("5", "Second version.");
        later.created_at = original.created_at + chrono::Duration::hours(1);
        db.save_draft(&later).await.unwrap();

        let loaded = db.load_draft("5").await.unwrap().unwrap();
        assert_eq!(loaded.reply_text, "Second version.");
        assert_eq!(
            format_datetime(&loaded.created_at),
            format_datetime(&original.created_at)
        );
    }

    #[tokio::test]
    async fn empty_draft_rejected() {
        let db = test_db().await;
        let draft = make_draft("9", "   ");
        let err = db.save_draft(&draft).await.unwrap_err();
        assert!(matches!(err, DraftError::Empty { .. }));
        assert!(db.load_draft("9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_most_recent_first() {
        let db = test_db().await;
        db.save_draft(&make_draft("a", "Reply to a.")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        db.save_draft(&make_draft("b", "Reply to b.")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        db.save_draft(&make_draft("a", "Reply to a, again.")).await.unwrap();

        let drafts = db.list_drafts().await.unwrap();
        let ids: Vec<&str> = drafts.iter().map(|d| d.message_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn drafts_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("drafts.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.save_draft(&make_draft("42", "Persisted reply."))
                .await
                .unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let loaded = db.load_draft("42").await.unwrap().unwrap();
        assert_eq!(loaded.reply_text, "Persisted reply.");
    }

    #[tokio::test]
    async fn draft_without_category_roundtrips() {
        let db = test_db().await;
        let mut draft = make_draft("77", "No category here.");
        draft.category = None;
        db.save_draft(&draft).await.unwrap();

        let loaded = db.load_draft("77").await.unwrap().unwrap();
        assert!(loaded.category.is_none());
    }

    #[test]
    fn datetime_parsing_formats() {
        let dt = parse_datetime("2026-03-01T12:30:00.000000Z");
        assert_eq!(format_datetime(&dt), "2026-03-01T12:30:00.000000Z");
        let dt = parse_datetime("2026-03-01 12:30:00");
        assert_eq!(format_datetime(&dt), "2026-03-01T12:30:00.000000Z");
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }
}

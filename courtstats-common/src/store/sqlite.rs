//! SQLite-backed document store
//!
//! One `documents` table holds every document as JSON text. A batch commits
//! inside a single SQL transaction; read-modify-write is optimistic on the
//! `version` column. Versions come from a store-wide clock, so a document
//! deleted and re-created never reuses a version seen earlier.

use super::retry::retry_on_conflict;
use super::{apply_write, check_batch_size, Document, DocumentStore, UpdateFn, WriteBatch};
use crate::fields::BATCH_LIMIT;
use crate::paths::DocPath;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use tracing::info;

const DEFAULT_MAX_WAIT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    batch_limit: usize,
    max_wait_ms: u64,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and ensure the schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        // WAL: concurrent readers alongside one writer
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the documents table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        create_documents_table(&pool).await?;
        Ok(Self {
            pool,
            batch_limit: BATCH_LIMIT,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        })
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// How long batch commits keep retrying on lock contention
    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current version of a document, `None` when absent
    pub async fn version(&self, path: &DocPath) -> Result<Option<i64>> {
        Ok(self.fetch(path).await?.map(|(_, version)| version))
    }

    async fn commit_once(&self, batch: &WriteBatch) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for op in batch.ops() {
            let path = op.path();
            let current = fetch_in_tx(&mut tx, path).await?.map(|(doc, _)| doc);
            match apply_write(current, op) {
                Some(doc) => upsert_in_tx(&mut tx, path, &doc).await?,
                None => {
                    sqlx::query("DELETE FROM documents WHERE path = ?")
                        .bind(path.as_str())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fetch(&self, path: &DocPath) -> Result<Option<(Document, i64)>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT data, version FROM documents WHERE path = ?")
                .bind(path.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(data, version)| Ok((parse_document(&data)?, version)))
            .transpose()
    }
}

async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            data TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, doc_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS version_clock (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            value INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before the clock existed start it past every stored version
    sqlx::query(
        "INSERT OR IGNORE INTO version_clock (id, value) SELECT 0, COALESCE(MAX(version), 0) FROM documents",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Advance the store-wide clock and return the new value
async fn next_version_in_tx(tx: &mut Transaction<'_, Sqlite>) -> Result<i64> {
    sqlx::query("UPDATE version_clock SET value = value + 1 WHERE id = 0")
        .execute(&mut **tx)
        .await?;
    let (version,): (i64,) = sqlx::query_as("SELECT value FROM version_clock WHERE id = 0")
        .fetch_one(&mut **tx)
        .await?;
    Ok(version)
}

fn parse_document(data: &str) -> Result<Document> {
    Ok(serde_json::from_str(data)?)
}

async fn fetch_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    path: &DocPath,
) -> Result<Option<(Document, i64)>> {
    let row: Option<(String, i64)> =
        sqlx::query_as("SELECT data, version FROM documents WHERE path = ?")
            .bind(path.as_str())
            .fetch_optional(&mut **tx)
            .await?;
    row.map(|(data, version)| Ok((parse_document(&data)?, version)))
        .transpose()
}

async fn upsert_in_tx(tx: &mut Transaction<'_, Sqlite>, path: &DocPath, doc: &Document) -> Result<()> {
    let data = serde_json::to_string(doc)?;
    let version = next_version_in_tx(tx).await?;
    sqlx::query(
        r#"
        INSERT INTO documents (path, collection, doc_id, data, version)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            data = excluded.data,
            version = excluded.version,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(path.as_str())
    .bind(path.collection())
    .bind(path.id())
    .bind(data)
    .bind(version)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        Ok(self.fetch(path).await?.map(|(doc, _)| doc))
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT doc_id, data FROM documents WHERE collection = ? ORDER BY doc_id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, data)| Ok((id, parse_document(&data)?)))
            .collect()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        check_batch_size(&batch, self.batch_limit)?;
        retry_on_conflict("batch commit", self.max_wait_ms, || self.commit_once(&batch)).await
    }

    async fn read_modify_write(&self, path: &DocPath, update: UpdateFn<'_>) -> Result<Document> {
        let (current, version) = match self.fetch(path).await? {
            Some((doc, version)) => (Some(doc), Some(version)),
            None => (None, None),
        };

        let next = update(current)?;
        let data = serde_json::to_string(&next)?;

        let mut tx = self.pool.begin().await?;
        let new_version = next_version_in_tx(&mut tx).await?;
        let result = match version {
            Some(v) => {
                sqlx::query(
                    r#"
                    UPDATE documents
                    SET data = ?, version = ?, updated_at = CURRENT_TIMESTAMP
                    WHERE path = ? AND version = ?
                    "#,
                )
                .bind(&data)
                .bind(new_version)
                .bind(path.as_str())
                .bind(v)
                .execute(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (path, collection, doc_id, data, version)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(path) DO NOTHING
                    "#,
                )
                .bind(path.as_str())
                .bind(path.collection())
                .bind(path.id())
                .bind(&data)
                .bind(new_version)
                .execute(&mut *tx)
                .await?
            }
        };

        // Dropping the transaction rolls the clock back too
        if result.rows_affected() == 0 {
            return Err(Error::Conflict(path.to_string()));
        }
        tx.commit().await?;
        Ok(next)
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

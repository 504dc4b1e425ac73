//! SQLite-backed queue using sqlx.

use {async_trait::async_trait, sqlx::SqlitePool};

use {
    crate::{
        Result,
        store::BacklogStore,
        types::{BacklogItem, BacklogStatus},
    },
    tybridge_common::now_ms,
};

#[derive(sqlx::FromRow)]
struct BacklogRow {
    id: i64,
    tenant_id: String,
    resource: String,
    status: String,
    retry_count: i64,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<BacklogRow> for BacklogItem {
    fn from(r: BacklogRow) -> Self {
        Self {
            id: r.id,
            tenant_id: r.tenant_id,
            resource: r.resource,
            status: BacklogStatus::parse(&r.status),
            retry_count: r.retry_count,
            last_error: r.last_error,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// SQLite-backed persistence for the deferred-event queue.
pub struct SqliteBacklogStore {
    pool: SqlitePool,
}

impl SqliteBacklogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the queue table. Safe to call repeatedly.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS backlog_queue (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id   TEXT    NOT NULL,
                resource    TEXT    NOT NULL,
                status      TEXT    NOT NULL DEFAULT 'pending',
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error  TEXT,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BacklogStore for SqliteBacklogStore {
    async fn enqueue(&self, item: &BacklogItem) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO backlog_queue
               (tenant_id, resource, status, retry_count, last_error, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.tenant_id)
        .bind(&item.resource)
        .bind(item.status.as_str())
        .bind(item.retry_count)
        .bind(&item.last_error)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn fetch_pending(&self, max_retries: i64) -> Result<Option<BacklogItem>> {
        let row = sqlx::query_as::<_, BacklogRow>(
            "SELECT * FROM backlog_queue
             WHERE status = 'pending' AND retry_count < ?
             ORDER BY id LIMIT 1",
        )
        .bind(max_retries)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get(&self, id: i64) -> Result<Option<BacklogItem>> {
        let row = sqlx::query_as::<_, BacklogRow>("SELECT * FROM backlog_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn mark_processing(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE backlog_queue SET status = 'processing', updated_at = ? WHERE id = ?")
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_done(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM backlog_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE backlog_queue
             SET status = 'pending', retry_count = retry_count + 1,
                 last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_exhausted(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE backlog_queue
             SET status = 'failed', retry_count = retry_count + 1,
                 last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn depth(&self, max_retries: i64) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM backlog_queue WHERE status = 'pending' AND retry_count < ?",
        )
        .bind(max_retries)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}

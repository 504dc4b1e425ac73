//! SQLite-backed session store using sqlx.

use {async_trait::async_trait, sqlx::SqlitePool};

use crate::{
    Result,
    store::SessionStore,
    types::{AuditEntry, SessionRecord, SessionState},
};

#[derive(sqlx::FromRow)]
struct SessionRow {
    ty_uid: String,
    tenant_id: String,
    session_token: Option<String>,
    state: String,
    failure_count: i64,
    last_error_code: Option<i64>,
    invalid_reason: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<SessionRow> for SessionRecord {
    fn from(r: SessionRow) -> Self {
        Self {
            ty_uid: r.ty_uid,
            tenant_id: r.tenant_id,
            session_token: r.session_token,
            state: SessionState::parse(&r.state),
            failure_count: r.failure_count,
            last_error_code: r.last_error_code,
            invalid_reason: r.invalid_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    ty_uid: String,
    session_token: Option<String>,
    old_state: String,
    new_state: String,
    reason: String,
    created_at: i64,
}

impl From<AuditRow> for AuditEntry {
    fn from(r: AuditRow) -> Self {
        Self {
            ty_uid: r.ty_uid,
            session_token: r.session_token,
            old_state: r.old_state,
            new_state: r.new_state,
            reason: r.reason,
            created_at: r.created_at,
        }
    }
}

/// SQLite-backed persistence for delivery sessions.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the session tables. Safe to call repeatedly.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS delivery_sessions (
                ty_uid          TEXT    PRIMARY KEY,
                tenant_id       TEXT    NOT NULL DEFAULT '',
                session_token   TEXT,
                state           TEXT    NOT NULL DEFAULT 'active',
                failure_count   INTEGER NOT NULL DEFAULT 0,
                last_error_code INTEGER,
                invalid_reason  TEXT,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS session_audit (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                ty_uid        TEXT    NOT NULL,
                session_token TEXT,
                old_state     TEXT    NOT NULL,
                new_state     TEXT    NOT NULL,
                reason        TEXT    NOT NULL,
                created_at    INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, ty_uid: &str) -> Result<Option<SessionRecord>> {
        let row =
            sqlx::query_as::<_, SessionRow>("SELECT * FROM delivery_sessions WHERE ty_uid = ?")
                .bind(ty_uid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn put(&self, record: &SessionRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO delivery_sessions
                 (ty_uid, tenant_id, session_token, state, failure_count,
                  last_error_code, invalid_reason, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(ty_uid) DO UPDATE SET
                 tenant_id       = excluded.tenant_id,
                 session_token   = excluded.session_token,
                 state           = excluded.state,
                 failure_count   = excluded.failure_count,
                 last_error_code = excluded.last_error_code,
                 invalid_reason  = excluded.invalid_reason,
                 updated_at      = excluded.updated_at"#,
        )
        .bind(&record.ty_uid)
        .bind(&record.tenant_id)
        .bind(&record.session_token)
        .bind(record.state.as_str())
        .bind(record.failure_count)
        .bind(record.last_error_code)
        .bind(&record.invalid_reason)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_audit
               (ty_uid, session_token, old_state, new_state, reason, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.ty_uid)
        .bind(&entry.session_token)
        .bind(&entry.old_state)
        .bind(&entry.new_state)
        .bind(&entry.reason)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_trail(&self, ty_uid: &str) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT ty_uid, session_token, old_state, new_state, reason, created_at
             FROM session_audit WHERE ty_uid = ? ORDER BY id",
        )
        .bind(ty_uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    use super::*;
    use crate::types::REASON_NEW_TOKEN;

    fn record(token: &str) -> SessionRecord {
        SessionRecord {
            ty_uid: "u1".to_string(),
            tenant_id: "t1".to_string(),
            session_token: Some(token.to_string()),
            state: SessionState::Active,
            failure_count: 0,
            last_error_code: None,
            invalid_reason: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn put_is_an_upsert() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteSessionStore::init(&pool).await.unwrap();
        let store = SqliteSessionStore::new(pool);

        store.put(&record("tok-1")).await.unwrap();
        store.put(&record("tok-2")).await.unwrap();

        let rec = store.get("u1").await.unwrap().unwrap();
        assert_eq!(rec.session_token.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn records_and_audit_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let opts = SqliteConnectOptions::new()
            .filename(dir.path().join("sessions.db"))
            .create_if_missing(true);

        {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(opts.clone())
                .await
                .unwrap();
            SqliteSessionStore::init(&pool).await.unwrap();
            let store = SqliteSessionStore::new(pool.clone());
            store.put(&record("tok-1")).await.unwrap();
            store
                .append_audit(&AuditEntry {
                    ty_uid: "u1".to_string(),
                    session_token: Some("tok-1".to_string()),
                    old_state: "none".to_string(),
                    new_state: SessionState::Active.as_str().to_string(),
                    reason: REASON_NEW_TOKEN.to_string(),
                    created_at: 1,
                })
                .await
                .unwrap();
            pool.close().await;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .unwrap();
        let store = SqliteSessionStore::new(pool);
        let rec = store.get("u1").await.unwrap().unwrap();
        assert_eq!(rec.state, SessionState::Active);
        let trail = store.audit_trail("u1").await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].reason, REASON_NEW_TOKEN);
    }
}

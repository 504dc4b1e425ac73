//! SQLite-backed mode store using sqlx.

use {async_trait::async_trait, sqlx::SqlitePool, tybridge_common::now_ms};

use crate::{Result, store::ModeStore, types::ConversationMode};

/// SQLite-backed persistence for conversation modes.
pub struct SqliteModeStore {
    pool: SqlitePool,
}

impl SqliteModeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the conversation state table. Safe to call repeatedly.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS conversation_state (
                ty_uid     TEXT    PRIMARY KEY,
                mode       TEXT    NOT NULL DEFAULT 'ai',
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ModeStore for SqliteModeStore {
    async fn get_mode(&self, ty_uid: &str) -> Result<ConversationMode> {
        let mode = sqlx::query_scalar::<_, String>(
            "SELECT mode FROM conversation_state WHERE ty_uid = ?",
        )
        .bind(ty_uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(mode.map(|m| ConversationMode::parse(&m)).unwrap_or_default())
    }

    async fn set_mode(&self, ty_uid: &str, mode: ConversationMode) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversation_state (ty_uid, mode, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(ty_uid) DO UPDATE SET
               mode = excluded.mode,
               updated_at = excluded.updated_at",
        )
        .bind(ty_uid)
        .bind(mode.as_str())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

//! Canonical identity resolution.
//!
//! Converges channel-specific identifiers onto one canonical `ty_uid` per
//! real person, with anchor-based auto-convergence, alias-preserving merges,
//! and actor-scoped human-readable handles.

pub mod error;
pub mod service;
pub mod types;

pub use {
    error::{Error, Result},
    service::{ANCHOR_METADATA_KEY, ANCHOR_PROVIDER, IdentityService},
    types::{CanonicalUser, DeliveryTarget, IdentityStatus, ResolvedIdentity},
};

/// Create the identity tables.
///
/// Call once at application startup; safe to call repeatedly.
pub async fn init_schema(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            ty_uid     TEXT    PRIMARY KEY,
            handle     TEXT    NOT NULL UNIQUE,
            actor_type TEXT    NOT NULL DEFAULT 'customer',
            status     TEXT    NOT NULL DEFAULT 'active',
            tenant_id  TEXT    NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS identities (
            provider     TEXT    NOT NULL,
            external_key TEXT    NOT NULL,
            ty_uid       TEXT    NOT NULL,
            is_verified  INTEGER NOT NULL DEFAULT 0,
            metadata     TEXT    NOT NULL DEFAULT '{}',
            created_at   INTEGER NOT NULL,
            updated_at   INTEGER NOT NULL,
            PRIMARY KEY (provider, external_key)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS user_alias (
            alias_uid   TEXT    PRIMARY KEY,
            primary_uid TEXT    NOT NULL,
            reason      TEXT    NOT NULL DEFAULT '',
            created_at  INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS handle_seq (
            actor_type TEXT    PRIMARY KEY,
            next_seq   INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS identity_audit (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            ty_uid     TEXT    NOT NULL,
            event      TEXT    NOT NULL,
            detail     TEXT    NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

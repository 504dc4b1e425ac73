//! Persistence trait for delivery-session records.

use async_trait::async_trait;

use crate::{
    Result,
    types::{AuditEntry, SessionRecord},
};

/// Backing store for session records and their audit trail.
///
/// The governor performs compound read-modify-write transitions under a
/// per-identity lock; implementations only need atomic single-record upserts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, ty_uid: &str) -> Result<Option<SessionRecord>>;
    async fn put(&self, record: &SessionRecord) -> Result<()>;
    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;
    async fn audit_trail(&self, ty_uid: &str) -> Result<Vec<AuditEntry>>;
}

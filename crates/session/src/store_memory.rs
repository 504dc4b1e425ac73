//! In-memory store for testing.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Result,
    store::SessionStore,
    types::{AuditEntry, SessionRecord},
};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            audit: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, ty_uid: &str) -> Result<Option<SessionRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(ty_uid).cloned())
    }

    async fn put(&self, record: &SessionRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(record.ty_uid.clone(), record.clone());
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let mut audit = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        audit.push(entry.clone());
        Ok(())
    }

    async fn audit_trail(&self, ty_uid: &str) -> Result<Vec<AuditEntry>> {
        let audit = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        Ok(audit.iter().filter(|e| e.ty_uid == ty_uid).cloned().collect())
    }
}

//! In-memory store for testing.

use std::sync::Mutex;

use async_trait::async_trait;

use {
    crate::{
        Result,
        store::BacklogStore,
        types::{BacklogItem, BacklogStatus},
    },
    tybridge_common::now_ms,
};

/// In-memory queue backed by a `Vec`. No persistence — for tests only.
pub struct InMemoryBacklogStore {
    items: Mutex<Vec<BacklogItem>>,
    next_id: Mutex<i64>,
}

impl InMemoryBacklogStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }
}

impl Default for InMemoryBacklogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BacklogStore for InMemoryBacklogStore {
    async fn enqueue(&self, item: &BacklogItem) -> Result<i64> {
        let mut next_id = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let mut stored = item.clone();
        stored.id = id;
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.push(stored);
        Ok(id)
    }

    async fn fetch_pending(&self, max_retries: i64) -> Result<Option<BacklogItem>> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        Ok(items
            .iter()
            .find(|i| i.status == BacklogStatus::Pending && i.retry_count < max_retries)
            .cloned())
    }

    async fn get(&self, id: i64) -> Result<Option<BacklogItem>> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        Ok(items.iter().find(|i| i.id == id).cloned())
    }

    async fn mark_processing(&self, id: i64) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.iter_mut().find(|i| i.id == id) {
            item.status = BacklogStatus::Processing;
            item.updated_at = now_ms();
        }
        Ok(())
    }

    async fn mark_done(&self, id: i64) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.retain(|i| i.id != id);
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.iter_mut().find(|i| i.id == id) {
            item.status = BacklogStatus::Pending;
            item.retry_count += 1;
            item.last_error = Some(error.to_string());
            item.updated_at = now_ms();
        }
        Ok(())
    }

    async fn mark_exhausted(&self, id: i64, error: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.iter_mut().find(|i| i.id == id) {
            item.status = BacklogStatus::Failed;
            item.retry_count += 1;
            item.last_error = Some(error.to_string());
            item.updated_at = now_ms();
        }
        Ok(())
    }

    async fn depth(&self, max_retries: i64) -> Result<i64> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        Ok(items
            .iter()
            .filter(|i| i.status == BacklogStatus::Pending && i.retry_count < max_retries)
            .count() as i64)
    }
}

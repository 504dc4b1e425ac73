//! Queue persistence seam.

use async_trait::async_trait;

use crate::{Result, types::BacklogItem};

/// Durable FIFO of deferred polling work.
///
/// A single worker consumes the queue, so fetch does not need to lease or
/// lock rows; it only has to honor ordering and the retry bound.
#[async_trait]
pub trait BacklogStore: Send + Sync {
    /// Append a pending item; returns its assigned id.
    async fn enqueue(&self, item: &BacklogItem) -> Result<i64>;

    /// Oldest pending item whose `retry_count` is still below `max_retries`,
    /// or `None` when the queue has no eligible work.
    async fn fetch_pending(&self, max_retries: i64) -> Result<Option<BacklogItem>>;

    /// Look up one item by id, whatever its status. Exhausted items stay in
    /// the table, so this is the inspection path for them.
    async fn get(&self, id: i64) -> Result<Option<BacklogItem>>;

    /// Flag an item as picked up by the worker.
    async fn mark_processing(&self, id: i64) -> Result<()>;

    /// Remove a finished item, keeping the table light.
    async fn mark_done(&self, id: i64) -> Result<()>;

    /// Return a failed item to pending with the error recorded and the
    /// retry counter advanced.
    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;

    /// Terminal failure: record the error, advance the counter, and park the
    /// item as `failed` so it is visibly out of rotation.
    async fn mark_exhausted(&self, id: i64, error: &str) -> Result<()>;

    /// Number of items still eligible for processing.
    async fn depth(&self, max_retries: i64) -> Result<i64>;
}

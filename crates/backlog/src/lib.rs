//! Durable queue of deferred polling work.
//!
//! Webhook triggers that cannot be polled immediately are parked here as
//! (tenant, service account) work units and drained strictly in arrival
//! order by a single worker.

pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;
pub mod worker;

pub use {
    error::{Error, Result},
    store::BacklogStore,
    store_memory::InMemoryBacklogStore,
    store_sqlite::SqliteBacklogStore,
    types::{BacklogItem, BacklogStatus},
    worker::{BacklogWorker, ProcessFn, WorkerConfig},
};

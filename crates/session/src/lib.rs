//! Per-identity delivery-session governance.
//!
//! The channel issues short-lived per-customer send tokens and fails hard
//! when one is misused. This crate owns the token lifecycle state machine,
//! the circuit breaker over repeated failures, and the append-only audit
//! trail of every transition.

pub mod error;
pub mod governor;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    error::{Error, Result},
    governor::{GovernorConfig, Rejection, SessionGovernor},
    store::SessionStore,
    store_memory::InMemorySessionStore,
    store_sqlite::SqliteSessionStore,
    types::{AuditEntry, SessionRecord, SessionState},
};

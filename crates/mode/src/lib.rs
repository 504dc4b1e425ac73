//! Per-identity AI/human routing.
//!
//! Every identity starts in AI mode. Escalation to HUMAN is one-way: a
//! trigger keyword, an explicit transfer intent, or an observed human
//! operator reply flips the flag, and only an explicit external action flips
//! it back. Whether HUMAN should ever auto-revert (e.g. after inactivity) is
//! an open product decision; this crate deliberately does not guess.

pub mod controller;
pub mod error;
pub mod escalation;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    controller::ModeController,
    error::{Error, Result},
    escalation::{EscalationRules, Intent},
    store::ModeStore,
    store_memory::InMemoryModeStore,
    store_sqlite::SqliteModeStore,
    types::ConversationMode,
};

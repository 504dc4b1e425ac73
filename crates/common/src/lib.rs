//! Shared types and utilities used across all tybridge crates.
//!
//! Error types are deliberately per-crate; each crate owns a typed
//! `thiserror` enum and a `Result` alias instead of sharing one catch-all.

pub mod telemetry;
pub mod types;

pub use telemetry::init_telemetry;
pub use types::{ActorType, InboundEvent, now_ms, trace_id};

//! At-most-once admission for inbound event ids.
//!
//! The gate is owned, injected state (construct one per bridge instance) —
//! not a process-wide singleton — so it can be dropped, swapped, or sharded
//! without global teardown.

pub mod gate;

pub use gate::{DedupGate, GateStats};

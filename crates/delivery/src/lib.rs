//! Tiered self-healing send protocol.
//!
//! The external channel issues short-lived per-customer tokens and rejects
//! sends with classified session-state errors when its internal state
//! drifts. The engine runs an ordered ladder of attempts (primary,
//! recover-then-fallback, blind) against that quirk. The ladder's ordering
//! and cooldowns are empirically tuned to one channel and reproduced
//! faithfully; rungs are data, so adding or removing one is a configuration
//! change.

pub mod client;
pub mod engine;
pub mod error;
pub mod ladder;

pub use {
    client::{ChannelClient, ChannelProfile, SendOutcome, SendTarget, ServiceState},
    engine::{DeliveryEngine, DeliveryReport},
    error::{Error, Result},
    ladder::{AttemptSpec, DeliveryConfig, TokenPolicy},
};

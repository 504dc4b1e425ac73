//! Inbound pipeline orchestration.
//!
//! Ties the governance crates together: admission through the dedup gate,
//! identity resolution, session token bookkeeping, CRM mirroring, AI/human
//! routing, and governed delivery. The enclosing service owns the webhook
//! surface and the concrete channel/CRM clients; this crate owns the order
//! things happen in.

pub mod config;
pub mod crm;
pub mod error;
pub mod pipeline;
pub mod types;

pub use {
    config::BridgeConfig,
    crm::{CrmClient, CrmDirection},
    error::{Error, Result},
    pipeline::{Bridge, ReplyFn},
    types::InboundOutcome,
};

//! Capability interface onto the external channel.
//!
//! This core never constructs wire payloads; the enclosing service supplies
//! an implementation speaking the channel's actual API.

use async_trait::async_trait;

/// Where a send goes: the customer's channel key plus the service account
/// the conversation lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTarget {
    pub external_key: String,
    pub resource: String,
}

/// Customer profile data the channel exposes.
#[derive(Debug, Clone, Default)]
pub struct ChannelProfile {
    pub nickname: Option<String>,
    /// Cross-channel anchor value, when the channel reveals one.
    pub anchor: Option<String>,
}

/// Channel-side conversation states the recovery sequence walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Conversation parked; no one assigned.
    Neutral,
    /// Conversation active and assigned to an operator.
    ActiveWithOperator,
    /// Conversation active with no operator assigned.
    ActiveWithoutOperator,
}

/// Result of one send attempt as the channel reports it.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Delivered,
    Failed { code: i64, message: String },
}

/// Outbound capability of the external channel.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// One send attempt; `token` is the channel-issued session token, or
    /// `None` for a token-less (blind) send.
    async fn send(
        &self,
        target: &SendTarget,
        content: &str,
        token: Option<&str>,
    ) -> anyhow::Result<SendOutcome>;

    /// Force the channel-side conversation state. Returns whether the
    /// channel accepted the transition; failures are expected and handled
    /// by the recovery sequence, not surfaced.
    async fn transition_state(
        &self,
        target: &SendTarget,
        state: ServiceState,
        operator: Option<&str>,
    ) -> bool;

    /// Customer profile lookup; `None` when the channel has nothing.
    async fn get_profile(&self, external_key: &str) -> Option<ChannelProfile>;
}

//! Types shared between the governance crates and the enclosing service.

use std::time::{SystemTime, UNIX_EPOCH};

use {
    rand::{Rng, distr::Alphanumeric},
    serde::{Deserialize, Serialize},
};

/// Kind of actor a canonical identity represents.
///
/// The handle prefix is part of the public identity contract: handles look
/// like `U-000123` and are allocated from a per-actor-type sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    #[default]
    Customer,
    Agent,
    Employee,
    Partner,
}

impl ActorType {
    #[must_use]
    pub fn handle_prefix(&self) -> &'static str {
        match self {
            Self::Customer => "U",
            Self::Agent => "A",
            Self::Employee => "E",
            Self::Partner => "P",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
            Self::Employee => "employee",
            Self::Partner => "partner",
        }
    }
}

impl std::str::FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "agent" => Ok(Self::Agent),
            "employee" => Ok(Self::Employee),
            "partner" => Ok(Self::Partner),
            other => Err(format!("unknown actor type: {other}")),
        }
    }
}

/// A decrypted, signature-verified inbound channel event.
///
/// Decryption and signature verification happen upstream; this core only
/// consumes the verified payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Channel-assigned message id, the dedup key.
    pub message_id: String,
    /// Channel-specific sender identifier.
    pub sender_external_key: String,
    /// Message text (placeholder like `[image]` for non-text payloads).
    pub content: String,
    /// Short-lived per-customer send credential, when the event carries one.
    pub session_token: Option<String>,
    /// Tenant the event belongs to.
    pub tenant_id: String,
    /// Channel service account the event arrived on.
    pub resource: String,
    /// Channel-reported send time, epoch seconds.
    pub sent_at: i64,
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Short random identifier used to correlate log lines across the attempts
/// of one delivery.
#[must_use]
pub fn trace_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_type_round_trip() {
        for ty in [
            ActorType::Customer,
            ActorType::Agent,
            ActorType::Employee,
            ActorType::Partner,
        ] {
            assert_eq!(ty.as_str().parse::<ActorType>(), Ok(ty));
        }
        assert!("robot".parse::<ActorType>().is_err());
    }

    #[test]
    fn handle_prefixes_are_distinct() {
        let prefixes = [
            ActorType::Customer.handle_prefix(),
            ActorType::Agent.handle_prefix(),
            ActorType::Employee.handle_prefix(),
            ActorType::Partner.handle_prefix(),
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for b in prefixes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn trace_ids_are_short_and_unique_enough() {
        let a = trace_id();
        let b = trace_id();
        assert_eq!(a.len(), 7);
        assert_ne!(a, b);
    }
}

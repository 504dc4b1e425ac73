//! The attempt ladder as data.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether a rung supplies the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    WithToken,
    /// Token-less send, exploiting the channel's tolerance for them while
    /// its internal state is otherwise healthy.
    NoToken,
}

/// One rung of the ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSpec {
    /// Label used in trace-correlated attempt logs.
    pub label: String,
    pub token_policy: TokenPolicy,
    /// Run the channel-state recovery sequence (and cooldown) before this
    /// rung.
    pub recover_first: bool,
}

impl AttemptSpec {
    #[must_use]
    pub fn new(label: &str, token_policy: TokenPolicy, recover_first: bool) -> Self {
        Self {
            label: label.to_string(),
            token_policy,
            recover_first,
        }
    }
}

/// Delivery tuning.
///
/// Error codes and cooldowns are empirical constants observed against one
/// external channel; expose them as configuration and do not assume they
/// generalize.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Rungs, run in order. Default: primary, recover-then-fallback, blind.
    pub ladder: Vec<AttemptSpec>,
    /// Channel error codes classified as session-state rejections.
    pub session_error_codes: Vec<i64>,
    /// Pause after parking the conversation during recovery.
    pub recovery_settle: Duration,
    /// Pause after the recovery sequence, before the next attempt.
    pub cooldown: Duration,
    /// Operator to assign when forcing the active-with-operator state.
    pub operator: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            ladder: vec![
                AttemptSpec::new("primary", TokenPolicy::WithToken, false),
                AttemptSpec::new("fallback", TokenPolicy::WithToken, true),
                AttemptSpec::new("blind", TokenPolicy::NoToken, false),
            ],
            session_error_codes: vec![95018, 95016],
            recovery_settle: Duration::from_millis(800),
            cooldown: Duration::from_millis(1500),
            operator: None,
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub fn is_session_error(&self, code: i64) -> bool {
        self.session_error_codes.contains(&code)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_shape() {
        let cfg = DeliveryConfig::default();
        let labels: Vec<&str> = cfg.ladder.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["primary", "fallback", "blind"]);
        assert!(cfg.ladder[1].recover_first);
        assert_eq!(cfg.ladder[2].token_policy, TokenPolicy::NoToken);
        assert!(cfg.is_session_error(95018));
        assert!(cfg.is_session_error(95016));
        assert!(!cfg.is_session_error(500));
    }
}

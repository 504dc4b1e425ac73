//! The send engine: pre-flight gate, ladder execution, failure reporting.

use std::sync::Arc;

use {
    tokio::time::sleep,
    tracing::{info, warn},
    tybridge_common::trace_id,
    tybridge_session::{Rejection, SessionGovernor},
};

use crate::{
    client::{ChannelClient, SendOutcome, SendTarget, ServiceState},
    error::{Error, Result},
    ladder::{DeliveryConfig, TokenPolicy},
};

/// What a successful delivery took.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// 1-based index of the rung that went through.
    pub attempts: usize,
    /// Shared across the log lines of all attempts of this delivery.
    pub trace_id: String,
}

/// Governed outbound sender.
pub struct DeliveryEngine {
    governor: Arc<SessionGovernor>,
    client: Arc<dyn ChannelClient>,
    cfg: DeliveryConfig,
}

impl DeliveryEngine {
    pub fn new(
        governor: Arc<SessionGovernor>,
        client: Arc<dyn ChannelClient>,
        cfg: DeliveryConfig,
    ) -> Self {
        Self {
            governor,
            client,
            cfg,
        }
    }

    /// Deliver `content` to an identity's channel address.
    ///
    /// Consults the session governor before any network attempt, then runs
    /// the configured ladder, reporting every failing attempt back so the
    /// breaker accumulates correctly.
    pub async fn send(
        &self,
        ty_uid: &str,
        target: &SendTarget,
        content: &str,
    ) -> Result<DeliveryReport> {
        let session = match self.governor.authorize(ty_uid).await? {
            Ok(record) => record,
            Err(Rejection::SessionInactive) => {
                return Err(Error::SessionInactive {
                    ty_uid: ty_uid.to_string(),
                });
            },
            Err(Rejection::CircuitBreakerOpen) => {
                return Err(Error::CircuitBreakerOpen {
                    ty_uid: ty_uid.to_string(),
                });
            },
        };
        let token = session.session_token;
        let trace = trace_id();

        for (index, rung) in self.cfg.ladder.iter().enumerate() {
            if rung.recover_first {
                self.recover(target, &trace).await;
                sleep(self.cfg.cooldown).await;
            }

            let attempt_token = match rung.token_policy {
                TokenPolicy::WithToken => token.as_deref(),
                TokenPolicy::NoToken => None,
            };

            match self.client.send(target, content, attempt_token).await? {
                SendOutcome::Delivered => {
                    info!(
                        trace = %trace,
                        attempt = %rung.label,
                        external_key = %target.external_key,
                        "delivery succeeded"
                    );
                    return Ok(DeliveryReport {
                        attempts: index + 1,
                        trace_id: trace,
                    });
                },
                SendOutcome::Failed { code, message } if self.cfg.is_session_error(code) => {
                    warn!(
                        trace = %trace,
                        attempt = %rung.label,
                        code,
                        "classified session rejection"
                    );
                    if index + 1 < self.cfg.ladder.len() {
                        self.governor.report_failure(ty_uid).await?;
                    } else {
                        // Ladder exhausted: terminal classified failure.
                        self.governor.invalidate(ty_uid, code, &message).await?;
                        return Err(Error::ChannelSessionError { code, message });
                    }
                },
                SendOutcome::Failed { code, message } => {
                    warn!(
                        trace = %trace,
                        attempt = %rung.label,
                        code,
                        "unclassified send failure, aborting ladder"
                    );
                    self.governor.report_failure(ty_uid).await?;
                    return Err(Error::Transient { code, message });
                },
            }
        }

        Err(Error::Config {
            message: "delivery ladder is empty".to_string(),
        })
    }

    /// Channel-state recovery sequence: park the conversation, settle,
    /// force active-with-operator, fall back to active-without-operator.
    ///
    /// Ordering reproduces the observed behavior of the channel; reordering
    /// risks reproducing the stuck-session failure mode this exists to fix.
    async fn recover(&self, target: &SendTarget, trace: &str) {
        info!(trace = %trace, external_key = %target.external_key, "running session recovery");
        self.client
            .transition_state(target, ServiceState::Neutral, None)
            .await;
        sleep(self.cfg.recovery_settle).await;
        let assigned = self
            .client
            .transition_state(
                target,
                ServiceState::ActiveWithOperator,
                self.cfg.operator.as_deref(),
            )
            .await;
        if !assigned {
            self.client
                .transition_state(target, ServiceState::ActiveWithoutOperator, None)
                .await;
        }
    }
}

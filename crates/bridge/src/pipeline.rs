//! Inbound orchestration: one function wiring the gate, identity, session,
//! mode, delivery, and CRM mirroring together in the order the control flow
//! requires.

use std::{future::Future, pin::Pin, sync::Arc};

use {
    serde_json::Value,
    tracing::{info, warn},
    tybridge_common::{InboundEvent, now_ms},
    tybridge_dedup::DedupGate,
    tybridge_delivery::{ChannelClient, DeliveryEngine, SendOutcome, SendTarget},
    tybridge_identity::{ANCHOR_METADATA_KEY, IdentityService, ResolvedIdentity},
    tybridge_mode::{ConversationMode, ModeController},
    tybridge_session::SessionGovernor,
};

use crate::{
    config::BridgeConfig,
    crm::{CrmClient, CrmDirection},
    error::{Error, Result},
    types::InboundOutcome,
};

/// Produces the automated reply text for a resolved customer message.
/// Response production is external; the pipeline only routes its output.
pub type ReplyFn = Arc<
    dyn Fn(ResolvedIdentity, String) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>>
        + Send
        + Sync,
>;

/// The governance pipeline facade.
pub struct Bridge {
    dedup: Arc<DedupGate>,
    identity: Arc<IdentityService>,
    governor: Arc<SessionGovernor>,
    mode: Arc<ModeController>,
    engine: Arc<DeliveryEngine>,
    channel: Arc<dyn ChannelClient>,
    crm: Arc<dyn CrmClient>,
    reply: ReplyFn,
    cfg: BridgeConfig,
}

impl Bridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dedup: Arc<DedupGate>,
        identity: Arc<IdentityService>,
        governor: Arc<SessionGovernor>,
        mode: Arc<ModeController>,
        engine: Arc<DeliveryEngine>,
        channel: Arc<dyn ChannelClient>,
        crm: Arc<dyn CrmClient>,
        reply: ReplyFn,
        cfg: BridgeConfig,
    ) -> Self {
        Self {
            dedup,
            identity,
            governor,
            mode,
            engine,
            channel,
            crm,
            reply,
            cfg,
        }
    }

    /// Run one inbound event through the pipeline.
    ///
    /// The dedup admission is finalized exactly once on any completed
    /// outcome; a failure before the channel send releases the admission so
    /// the channel's redelivery gets a clean retry. Once a delivery attempt
    /// has run, the event always finalizes: redelivering it could reach the
    /// customer twice.
    pub async fn handle_inbound(&self, event: InboundEvent) -> Result<InboundOutcome> {
        if !self.dedup.acquire(&event.message_id) {
            info!(message_id = %event.message_id, "duplicate inbound suppressed");
            return Ok(InboundOutcome::DuplicateSuppressed);
        }

        match self.process(&event).await {
            Ok(outcome) => {
                self.dedup.mark_processed(&event.message_id);
                Ok(outcome)
            },
            Err(err) => {
                warn!(message_id = %event.message_id, error = %err, "inbound processing failed");
                self.dedup.release(&event.message_id);
                Err(err)
            },
        }
    }

    async fn process(&self, event: &InboundEvent) -> Result<InboundOutcome> {
        let metadata = self.enrich(&event.sender_external_key).await;
        let resolved = self
            .identity
            .resolve_or_create(
                &self.cfg.provider,
                &event.sender_external_key,
                metadata,
                &event.tenant_id,
            )
            .await?;

        if let Some(token) = &event.session_token {
            self.governor
                .token_event(&resolved.ty_uid, &event.tenant_id, token)
                .await?;
        }

        self.crm
            .upsert_contact(&resolved.handle, resolved.nickname.as_deref())
            .await
            .map_err(Error::Crm)?;
        self.crm
            .post_message(&resolved.handle, &event.content, CrmDirection::In, false)
            .await
            .map_err(Error::Crm)?;

        // Escalation is noted even for messages that end up skipped below;
        // a stale transfer request must still hand the conversation over.
        let mode = self.mode.note_inbound(&resolved.ty_uid, &event.content).await?;

        if now_ms() / 1000 - event.sent_at > self.cfg.stale_threshold_secs {
            info!(ty_uid = %resolved.ty_uid, sent_at = event.sent_at, "stale event, reply skipped");
            return Ok(InboundOutcome::Stale {
                ty_uid: resolved.ty_uid,
            });
        }

        let reply = (self.reply)(resolved.clone(), event.content.clone())
            .await
            .map_err(Error::Reply)?;

        if mode == ConversationMode::Human {
            self.crm
                .post_message(
                    &resolved.handle,
                    &format!("[AI suggestion] {reply}"),
                    CrmDirection::Out,
                    true,
                )
                .await
                .map_err(Error::Crm)?;
            return Ok(InboundOutcome::SuggestionPosted {
                ty_uid: resolved.ty_uid,
            });
        }

        let target = SendTarget {
            external_key: event.sender_external_key.clone(),
            resource: event.resource.clone(),
        };
        // Past this point the admission must finalize whatever happens: the
        // delivery attempt ran, and a released admission would let the
        // channel's redelivery send the reply to the customer again. CRM
        // mirror trouble after the send is logged, not propagated.
        match self.engine.send(&resolved.ty_uid, &target, &reply).await {
            Ok(report) => {
                if let Err(err) = self
                    .crm
                    .post_message(&resolved.handle, &reply, CrmDirection::Out, false)
                    .await
                {
                    warn!(ty_uid = %resolved.ty_uid, error = %err, "outbound mirror failed after delivery");
                }
                Ok(InboundOutcome::Replied {
                    ty_uid: resolved.ty_uid,
                    attempts: report.attempts,
                })
            },
            Err(err) => {
                warn!(ty_uid = %resolved.ty_uid, error = %err, "delivery failed, alerting crm");
                if let Err(post_err) = self
                    .crm
                    .post_message(
                        &resolved.handle,
                        &format!("[delivery failed] {err}"),
                        CrmDirection::Out,
                        true,
                    )
                    .await
                {
                    warn!(ty_uid = %resolved.ty_uid, error = %post_err, "failure alert did not reach crm");
                }
                Ok(InboundOutcome::DeliveryFailed {
                    ty_uid: resolved.ty_uid,
                    error: err.to_string(),
                })
            },
        }
    }

    /// Operator wrote on the CRM side: relay to the customer's channel and,
    /// if the channel took it, hand the conversation to the human.
    ///
    /// Only known recipients are relayed to; an operator reply never founds
    /// an identity.
    pub async fn handle_operator_reply(
        &self,
        external_key: &str,
        resource: &str,
        content: &str,
    ) -> Result<()> {
        let resolved = self
            .identity
            .resolve_existing(&self.cfg.provider, external_key)
            .await?
            .ok_or_else(|| Error::UnknownRecipient {
                external_key: external_key.to_string(),
            })?;
        let target_addr = self
            .identity
            .resolve_delivery_target(&resolved.ty_uid, &[&self.cfg.provider])
            .await?;
        let target = SendTarget {
            external_key: target_addr.external_key,
            resource: resource.to_string(),
        };

        // Operator relays bypass the governed ladder; the raw send either
        // lands or the operator is told it did not.
        match self
            .channel
            .send(&target, content, None)
            .await
            .map_err(Error::Channel)?
        {
            SendOutcome::Delivered => {
                self.mode.note_operator_reply(&resolved.ty_uid).await?;
                Ok(())
            },
            SendOutcome::Failed { code, message } => {
                Err(Error::OperatorSendFailed { code, message })
            },
        }
    }

    async fn enrich(&self, external_key: &str) -> Value {
        let mut metadata = serde_json::Map::new();
        if let Some(profile) = self.channel.get_profile(external_key).await {
            if let Some(nickname) = profile.nickname {
                metadata.insert("nickname".to_string(), Value::String(nickname));
            }
            if let Some(anchor) = profile.anchor {
                metadata.insert(ANCHOR_METADATA_KEY.to_string(), Value::String(anchor));
            }
        }
        Value::Object(metadata)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use {
        async_trait::async_trait,
        sqlx::sqlite::SqlitePoolOptions,
        tybridge_delivery::{ChannelProfile, DeliveryConfig, ServiceState},
        tybridge_mode::{EscalationRules, InMemoryModeStore},
        tybridge_session::{GovernorConfig, InMemorySessionStore},
    };

    use super::*;

    #[derive(Default)]
    struct MockChannel {
        outcomes: Mutex<VecDeque<SendOutcome>>,
        sends: Mutex<Vec<(String, String, Option<String>)>>,
    }

    #[async_trait]
    impl ChannelClient for MockChannel {
        async fn send(
            &self,
            target: &SendTarget,
            content: &str,
            token: Option<&str>,
        ) -> anyhow::Result<SendOutcome> {
            self.sends.lock().unwrap().push((
                target.external_key.clone(),
                content.to_string(),
                token.map(str::to_string),
            ));
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SendOutcome::Delivered);
            Ok(outcome)
        }

        async fn transition_state(
            &self,
            _target: &SendTarget,
            _state: ServiceState,
            _operator: Option<&str>,
        ) -> bool {
            true
        }

        async fn get_profile(&self, _external_key: &str) -> Option<ChannelProfile> {
            Some(ChannelProfile {
                nickname: Some("Amy".to_string()),
                anchor: None,
            })
        }
    }

    #[derive(Default)]
    struct MockCrm {
        contacts: Mutex<Vec<(String, Option<String>)>>,
        posts: Mutex<Vec<(String, String, bool)>>,
        fail_posts: AtomicUsize,
        fail_public_out: AtomicUsize,
    }

    #[async_trait]
    impl CrmClient for MockCrm {
        async fn upsert_contact(&self, handle: &str, nickname: Option<&str>) -> anyhow::Result<()> {
            self.contacts
                .lock()
                .unwrap()
                .push((handle.to_string(), nickname.map(str::to_string)));
            Ok(())
        }

        async fn post_message(
            &self,
            handle: &str,
            content: &str,
            direction: CrmDirection,
            private: bool,
        ) -> anyhow::Result<()> {
            if self
                .fail_posts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("crm unavailable")
            }
            if direction == CrmDirection::Out
                && !private
                && self
                    .fail_public_out
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                anyhow::bail!("crm unavailable")
            }
            self.posts
                .lock()
                .unwrap()
                .push((handle.to_string(), content.to_string(), private));
            Ok(())
        }
    }

    struct Harness {
        bridge: Arc<Bridge>,
        channel: Arc<MockChannel>,
        crm: Arc<MockCrm>,
        mode: Arc<ModeController>,
    }

    async fn harness() -> Harness {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        tybridge_identity::init_schema(&pool).await.unwrap();

        let identity = Arc::new(IdentityService::new(pool));
        let governor = Arc::new(SessionGovernor::new(
            Arc::new(InMemorySessionStore::new()),
            GovernorConfig::default(),
        ));
        let mode = Arc::new(ModeController::new(
            Arc::new(InMemoryModeStore::new()),
            EscalationRules::default(),
        ));
        let channel = Arc::new(MockChannel::default());
        let crm = Arc::new(MockCrm::default());
        let engine = Arc::new(DeliveryEngine::new(
            Arc::clone(&governor),
            Arc::clone(&channel) as Arc<dyn ChannelClient>,
            DeliveryConfig {
                recovery_settle: Duration::ZERO,
                cooldown: Duration::ZERO,
                ..DeliveryConfig::default()
            },
        ));
        let reply: ReplyFn = Arc::new(|_resolved, content| {
            Box::pin(async move { Ok(format!("echo: {content}")) })
        });

        let bridge = Arc::new(Bridge::new(
            Arc::new(DedupGate::new()),
            identity,
            governor,
            Arc::clone(&mode),
            engine,
            Arc::clone(&channel) as Arc<dyn ChannelClient>,
            Arc::clone(&crm) as Arc<dyn CrmClient>,
            reply,
            BridgeConfig::default(),
        ));
        Harness {
            bridge,
            channel,
            crm,
            mode,
        }
    }

    fn event(message_id: &str, external_key: &str, content: &str) -> InboundEvent {
        InboundEvent {
            message_id: message_id.to_string(),
            sender_external_key: external_key.to_string(),
            content: content.to_string(),
            session_token: Some("tok-1".to_string()),
            tenant_id: "t1".to_string(),
            resource: "kf-1".to_string(),
            sent_at: now_ms() / 1000,
        }
    }

    #[tokio::test]
    async fn ai_mode_reply_is_delivered_and_mirrored() {
        let h = harness().await;
        let outcome = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await.unwrap();
        assert!(matches!(outcome, InboundOutcome::Replied { attempts: 1, .. }));

        let sends = h.channel.sends.lock().unwrap().clone();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].1, "echo: hello");
        assert_eq!(sends[0].2.as_deref(), Some("tok-1"));

        let contacts = h.crm.contacts.lock().unwrap().clone();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].1.as_deref(), Some("Amy"));

        let posts = h.crm.posts.lock().unwrap().clone();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].1, "hello");
        assert!(!posts[0].2);
        assert_eq!(posts[1].1, "echo: hello");
        assert!(!posts[1].2);
    }

    #[tokio::test]
    async fn duplicate_event_is_suppressed() {
        let h = harness().await;
        let first = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await.unwrap();
        assert!(matches!(first, InboundOutcome::Replied { .. }));

        let second = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await.unwrap();
        assert_eq!(second, InboundOutcome::DuplicateSuppressed);
        assert_eq!(h.channel.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn escalation_message_routes_to_private_suggestion() {
        let h = harness().await;
        let outcome = h
            .bridge
            .handle_inbound(event("m1", "ext-1", "请帮我转人工"))
            .await
            .unwrap();
        assert!(matches!(outcome, InboundOutcome::SuggestionPosted { .. }));
        assert!(h.channel.sends.lock().unwrap().is_empty(), "no channel send in human mode");

        let posts = h.crm.posts.lock().unwrap().clone();
        let last = posts.last().unwrap();
        assert!(last.1.starts_with("[AI suggestion]"));
        assert!(last.2, "suggestion must be a private note");
    }

    #[tokio::test]
    async fn stale_event_still_does_bookkeeping_but_skips_reply() {
        let h = harness().await;
        let mut ev = event("m1", "ext-1", "请转人工");
        ev.sent_at = now_ms() / 1000 - 300;

        let outcome = h.bridge.handle_inbound(ev).await.unwrap();
        let InboundOutcome::Stale { ty_uid } = outcome else {
            panic!("expected stale outcome, got {outcome:?}");
        };

        assert!(h.channel.sends.lock().unwrap().is_empty());
        assert_eq!(h.crm.posts.lock().unwrap().len(), 1, "inbound still mirrored");
        // The escalation trigger in the stale message still counts.
        assert_eq!(h.mode.mode(&ty_uid).await.unwrap(), ConversationMode::Human);
    }

    #[tokio::test]
    async fn failed_processing_releases_admission_for_retry() {
        let h = harness().await;
        h.crm.fail_posts.store(1, Ordering::SeqCst);

        let err = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await;
        assert!(err.is_err());

        // Redelivery of the same id is admitted again and completes.
        let retry = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await.unwrap();
        assert!(matches!(retry, InboundOutcome::Replied { .. }));
    }

    #[tokio::test]
    async fn mirror_failure_after_delivery_does_not_resend() {
        let h = harness().await;
        // Only the visible outbound mirror fails; the channel send lands.
        h.crm.fail_public_out.store(1, Ordering::SeqCst);

        let outcome = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await.unwrap();
        assert!(matches!(outcome, InboundOutcome::Replied { .. }));

        // The admission stays finalized, so redelivery cannot reach the
        // customer a second time.
        let second = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await.unwrap();
        assert_eq!(second, InboundOutcome::DuplicateSuppressed);
        assert_eq!(
            h.channel.sends.lock().unwrap().len(),
            1,
            "customer must receive the reply exactly once"
        );
    }

    #[tokio::test]
    async fn delivery_failure_becomes_private_alert() {
        let h = harness().await;
        h.crm.posts.lock().unwrap().clear();
        h.channel.outcomes.lock().unwrap().push_back(SendOutcome::Failed {
            code: 500,
            message: "server error".to_string(),
        });

        let outcome = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await.unwrap();
        assert!(matches!(outcome, InboundOutcome::DeliveryFailed { .. }));

        let posts = h.crm.posts.lock().unwrap().clone();
        let last = posts.last().unwrap();
        assert!(last.1.starts_with("[delivery failed]"));
        assert!(last.2);
    }

    #[tokio::test]
    async fn missing_token_means_no_session_and_no_delivery() {
        let h = harness().await;
        let mut ev = event("m1", "ext-1", "hello");
        ev.session_token = None;

        let outcome = h.bridge.handle_inbound(ev).await.unwrap();
        let InboundOutcome::DeliveryFailed { error, .. } = outcome else {
            panic!("expected delivery failure without a session");
        };
        assert!(error.contains("session inactive"));
        assert!(h.channel.sends.lock().unwrap().is_empty(), "blocked before network");
    }

    #[tokio::test]
    async fn operator_reply_relays_raw_and_takes_over() {
        let h = harness().await;
        let outcome = h.bridge.handle_inbound(event("m1", "ext-1", "hello")).await.unwrap();
        let InboundOutcome::Replied { ty_uid, .. } = outcome else {
            panic!("seed delivery failed");
        };
        assert_eq!(h.mode.mode(&ty_uid).await.unwrap(), ConversationMode::Ai);

        h.bridge
            .handle_operator_reply("ext-1", "kf-1", "operator here")
            .await
            .unwrap();

        let sends = h.channel.sends.lock().unwrap().clone();
        let last = sends.last().unwrap();
        assert_eq!(last.1, "operator here");
        assert!(last.2.is_none(), "operator relay is token-less");
        assert_eq!(h.mode.mode(&ty_uid).await.unwrap(), ConversationMode::Human);
    }

    #[tokio::test]
    async fn operator_reply_to_unknown_key_is_rejected() {
        let h = harness().await;
        let err = h.bridge.handle_operator_reply("ghost", "kf-1", "hi").await;
        assert!(matches!(err, Err(Error::UnknownRecipient { .. })));
        assert!(h.channel.sends.lock().unwrap().is_empty(), "nothing relayed");
    }
}

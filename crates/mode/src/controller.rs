//! One-way escalation logic over a [`ModeStore`].

use std::sync::Arc;

use tracing::info;

use crate::{
    Result,
    escalation::{EscalationRules, Intent},
    store::ModeStore,
    types::ConversationMode,
};

/// Decides whether an automated reply is produced for an identity.
pub struct ModeController {
    store: Arc<dyn ModeStore>,
    rules: EscalationRules,
}

impl ModeController {
    pub fn new(store: Arc<dyn ModeStore>, rules: EscalationRules) -> Self {
        Self { store, rules }
    }

    /// Current mode; unseen identities are AI.
    pub async fn mode(&self, ty_uid: &str) -> Result<ConversationMode> {
        self.store.get_mode(ty_uid).await
    }

    /// Record an inbound customer message.
    ///
    /// Returns the mode in effect for this message, after applying any
    /// escalation trigger it carries. Escalation is one-way; a HUMAN session
    /// stays HUMAN no matter what the customer writes.
    pub async fn note_inbound(&self, ty_uid: &str, content: &str) -> Result<ConversationMode> {
        let current = self.store.get_mode(ty_uid).await?;
        if current == ConversationMode::Ai && self.rules.is_escalation(content) {
            self.store.set_mode(ty_uid, ConversationMode::Human).await?;
            info!(ty_uid, "escalation trigger matched, conversation handed to human");
            return Ok(ConversationMode::Human);
        }
        Ok(current)
    }

    /// A human operator replied on the CRM side: takeover.
    pub async fn note_operator_reply(&self, ty_uid: &str) -> Result<()> {
        let current = self.store.get_mode(ty_uid).await?;
        if current != ConversationMode::Human {
            self.store.set_mode(ty_uid, ConversationMode::Human).await?;
            info!(ty_uid, "operator takeover, conversation handed to human");
        }
        Ok(())
    }

    /// Explicit external action; the only path back to AI.
    pub async fn set_mode(&self, ty_uid: &str, mode: ConversationMode) -> Result<()> {
        self.store.set_mode(ty_uid, mode).await?;
        info!(ty_uid, mode = mode.as_str(), "conversation mode set explicitly");
        Ok(())
    }

    /// Classify a message without touching the mode.
    #[must_use]
    pub fn classify(&self, content: &str) -> Intent {
        self.rules.classify(content)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::InMemoryModeStore;

    fn controller() -> ModeController {
        ModeController::new(Arc::new(InMemoryModeStore::new()), EscalationRules::default())
    }

    #[tokio::test]
    async fn unseen_identity_defaults_to_ai() {
        let ctl = controller();
        assert_eq!(ctl.mode("u1").await.unwrap(), ConversationMode::Ai);
    }

    #[tokio::test]
    async fn escalation_trigger_flips_to_human() {
        let ctl = controller();
        let mode = ctl.note_inbound("u1", "请帮我转人工").await.unwrap();
        assert_eq!(mode, ConversationMode::Human);
        assert_eq!(ctl.mode("u1").await.unwrap(), ConversationMode::Human);
    }

    #[tokio::test]
    async fn plain_message_stays_ai() {
        let ctl = controller();
        let mode = ctl.note_inbound("u1", "押金怎么算").await.unwrap();
        assert_eq!(mode, ConversationMode::Ai);
    }

    #[tokio::test]
    async fn operator_reply_takes_over() {
        let ctl = controller();
        ctl.note_operator_reply("u1").await.unwrap();
        assert_eq!(ctl.mode("u1").await.unwrap(), ConversationMode::Human);
    }

    #[tokio::test]
    async fn human_mode_never_auto_reverts() {
        let ctl = controller();
        ctl.note_operator_reply("u1").await.unwrap();
        // Ordinary traffic does not flip it back.
        ctl.note_inbound("u1", "你好").await.unwrap();
        ctl.note_inbound("u1", "押金怎么算").await.unwrap();
        assert_eq!(ctl.mode("u1").await.unwrap(), ConversationMode::Human);

        // Only an explicit action does.
        ctl.set_mode("u1", ConversationMode::Ai).await.unwrap();
        assert_eq!(ctl.mode("u1").await.unwrap(), ConversationMode::Ai);
    }
}

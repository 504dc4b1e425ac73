//! Persistence trait for conversation modes.

use async_trait::async_trait;

use crate::{Result, types::ConversationMode};

/// Backing store for the per-identity routing flag.
#[async_trait]
pub trait ModeStore: Send + Sync {
    /// Current mode; unseen identities default to AI.
    async fn get_mode(&self, ty_uid: &str) -> Result<ConversationMode>;
    async fn set_mode(&self, ty_uid: &str, mode: ConversationMode) -> Result<()>;
}

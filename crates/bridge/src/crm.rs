//! Capability interface onto the CRM.
//!
//! The bridge mirrors every conversation into the CRM so operators see the
//! full history regardless of who answered. Wire details live in the
//! enclosing service.

use async_trait::async_trait;

/// Which side of the conversation a mirrored message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmDirection {
    /// Customer wrote it.
    In,
    /// The bridge (or an operator) wrote it.
    Out,
}

#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Create or refresh the CRM contact for a canonical handle.
    async fn upsert_contact(&self, handle: &str, nickname: Option<&str>) -> anyhow::Result<()>;

    /// Mirror one message onto the contact's timeline. `private` notes are
    /// visible to operators only, never to the customer.
    async fn post_message(
        &self,
        handle: &str,
        content: &str,
        direction: CrmDirection,
        private: bool,
    ) -> anyhow::Result<()>;
}

//! In-memory store for testing.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{Result, store::ModeStore, types::ConversationMode};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
pub struct InMemoryModeStore {
    modes: Mutex<HashMap<String, ConversationMode>>,
}

impl InMemoryModeStore {
    pub fn new() -> Self {
        Self {
            modes: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryModeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModeStore for InMemoryModeStore {
    async fn get_mode(&self, ty_uid: &str) -> Result<ConversationMode> {
        let modes = self.modes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(modes.get(ty_uid).copied().unwrap_or_default())
    }

    async fn set_mode(&self, ty_uid: &str, mode: ConversationMode) -> Result<()> {
        let mut modes = self.modes.lock().unwrap_or_else(|e| e.into_inner());
        modes.insert(ty_uid.to_string(), mode);
        Ok(())
    }
}

use serde::{Deserialize, Serialize};

/// Who answers the customer right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// Automated replies are produced and delivered.
    #[default]
    Ai,
    /// A human operator owns the conversation; automated replies are
    /// surfaced as private suggestions only.
    Human,
}

impl ConversationMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Human => "human",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "human" { Self::Human } else { Self::Ai }
    }
}

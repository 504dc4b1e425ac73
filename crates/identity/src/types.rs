use {serde::Serialize, tybridge_common::ActorType};

/// Lifecycle of a canonical identity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    /// Folded into another identity; redirected via `user_alias`.
    Merged,
}

impl IdentityStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Merged => "merged",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "merged" { Self::Merged } else { Self::Active }
    }
}

/// A canonical identity record.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalUser {
    pub ty_uid: String,
    pub handle: String,
    pub actor_type: ActorType,
    pub status: IdentityStatus,
    pub tenant_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Result of [`crate::IdentityService::resolve_or_create`].
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedIdentity {
    pub ty_uid: String,
    pub handle: String,
    pub actor_type: ActorType,
    pub nickname: Option<String>,
    /// True only for the call that founded the identity.
    pub is_new: bool,
}

/// Best external address to reach an identity on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryTarget {
    pub provider: String,
    pub external_key: String,
}

use serde::Serialize;

/// Delivery-session lifecycle.
///
/// Legal transitions: absent → `Active` (fresh token), `Active` → `Active`
/// (token refresh), `Active` → `Invalid` (classified rejection or breaker).
/// `Invalid` returns to `Active` only through a fresh token event — never
/// algorithmically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Invalid,
}

impl SessionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Invalid => "invalid",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "invalid" { Self::Invalid } else { Self::Active }
    }
}

/// Per-identity delivery-session record.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub ty_uid: String,
    pub tenant_id: String,
    /// Latest channel-issued send token; latest always wins.
    pub session_token: Option<String>,
    pub state: SessionState,
    pub failure_count: i64,
    pub last_error_code: Option<i64>,
    pub invalid_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Append-only record of one state transition.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub ty_uid: String,
    pub session_token: Option<String>,
    pub old_state: String,
    pub new_state: String,
    pub reason: String,
    pub created_at: i64,
}

/// Audit reason recorded when a fresh token activates or revives a session.
pub const REASON_NEW_TOKEN: &str = "NEW_TOKEN_EVENT";

/// Audit reason recorded when the breaker trips on accumulated failures.
pub const REASON_CIRCUIT_BREAKER: &str = "CIRCUIT_BREAKER";

//! The session state machine and circuit breaker.

use std::sync::Arc;

use {
    dashmap::DashMap,
    tokio::sync::Mutex,
    tracing::{info, warn},
    tybridge_common::now_ms,
};

use crate::{
    Result,
    store::SessionStore,
    types::{
        AuditEntry, REASON_CIRCUIT_BREAKER, REASON_NEW_TOKEN, SessionRecord, SessionState,
    },
};

/// Breaker tuning.
///
/// The default threshold is an empirical constant tuned to one external
/// channel's observed behavior; do not assume it generalizes.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Failures (without an intervening token refresh) that trip the breaker.
    pub failure_threshold: i64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
        }
    }
}

/// Why [`SessionGovernor::authorize`] refused a send, distinguishable before
/// any network attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No usable session: never seen a token, or invalidated by a classified
    /// channel rejection.
    SessionInactive,
    /// Invalidated by accumulated failures; waiting for a fresh token.
    CircuitBreakerOpen,
}

/// Per-identity delivery-session governor.
///
/// Compound transitions are serialized per identity key; operations across
/// distinct identities proceed fully in parallel.
pub struct SessionGovernor {
    store: Arc<dyn SessionStore>,
    cfg: GovernorConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionGovernor {
    pub fn new(store: Arc<dyn SessionStore>, cfg: GovernorConfig) -> Self {
        Self {
            store,
            cfg,
            locks: DashMap::new(),
        }
    }

    /// A fresh token arrived with an inbound event.
    ///
    /// Activates an absent session, refreshes an active one (latest token
    /// wins), and is the only path that revives an invalid one. Resets the
    /// failure counter either way.
    pub async fn token_event(&self, ty_uid: &str, tenant_id: &str, token: &str) -> Result<()> {
        let lock = self.lock_for(ty_uid);
        let _guard = lock.lock().await;

        let previous = self.store.get(ty_uid).await?;
        let old_state = previous.as_ref().map(|r| r.state);
        let now = now_ms();
        let record = SessionRecord {
            ty_uid: ty_uid.to_string(),
            tenant_id: tenant_id.to_string(),
            session_token: Some(token.to_string()),
            state: SessionState::Active,
            failure_count: 0,
            last_error_code: None,
            invalid_reason: None,
            created_at: previous.as_ref().map_or(now, |r| r.created_at),
            updated_at: now,
        };
        self.store.put(&record).await?;

        if old_state != Some(SessionState::Active) {
            self.store
                .append_audit(&AuditEntry {
                    ty_uid: ty_uid.to_string(),
                    session_token: Some(token.to_string()),
                    old_state: state_label(old_state).to_string(),
                    new_state: SessionState::Active.as_str().to_string(),
                    reason: REASON_NEW_TOKEN.to_string(),
                    created_at: now,
                })
                .await?;
            info!(ty_uid, old_state = state_label(old_state), "session activated by token event");
        }
        Ok(())
    }

    /// Pure read of the current session record.
    pub async fn get_state(&self, ty_uid: &str) -> Result<Option<SessionRecord>> {
        self.store.get(ty_uid).await
    }

    /// Count one failed send attempt toward the breaker.
    ///
    /// Crossing the threshold flips the session to invalid even when no
    /// attempt was individually classified as a session rejection. Returns
    /// the record after the update, or `None` for an unknown identity.
    pub async fn report_failure(&self, ty_uid: &str) -> Result<Option<SessionRecord>> {
        let lock = self.lock_for(ty_uid);
        let _guard = lock.lock().await;

        let Some(mut record) = self.store.get(ty_uid).await? else {
            return Ok(None);
        };
        record.failure_count += 1;
        record.updated_at = now_ms();

        if record.state == SessionState::Active
            && record.failure_count >= self.cfg.failure_threshold
        {
            let old = record.state;
            record.state = SessionState::Invalid;
            record.invalid_reason = Some(REASON_CIRCUIT_BREAKER.to_string());
            self.store.put(&record).await?;
            self.store
                .append_audit(&AuditEntry {
                    ty_uid: ty_uid.to_string(),
                    session_token: record.session_token.clone(),
                    old_state: old.as_str().to_string(),
                    new_state: record.state.as_str().to_string(),
                    reason: REASON_CIRCUIT_BREAKER.to_string(),
                    created_at: record.updated_at,
                })
                .await?;
            warn!(
                ty_uid,
                failures = record.failure_count,
                "circuit breaker tripped, session invalidated"
            );
        } else {
            self.store.put(&record).await?;
        }
        Ok(Some(record))
    }

    /// Force the session invalid after a terminal classified rejection.
    pub async fn invalidate(&self, ty_uid: &str, error_code: i64, reason: &str) -> Result<()> {
        let lock = self.lock_for(ty_uid);
        let _guard = lock.lock().await;

        let previous = self.store.get(ty_uid).await?;
        let old_state = previous.as_ref().map(|r| r.state);
        let now = now_ms();
        let record = SessionRecord {
            ty_uid: ty_uid.to_string(),
            tenant_id: previous.as_ref().map_or_else(String::new, |r| r.tenant_id.clone()),
            session_token: previous.as_ref().and_then(|r| r.session_token.clone()),
            state: SessionState::Invalid,
            failure_count: previous.as_ref().map_or(0, |r| r.failure_count),
            last_error_code: Some(error_code),
            invalid_reason: Some(reason.to_string()),
            created_at: previous.as_ref().map_or(now, |r| r.created_at),
            updated_at: now,
        };
        self.store.put(&record).await?;
        self.store
            .append_audit(&AuditEntry {
                ty_uid: ty_uid.to_string(),
                session_token: record.session_token.clone(),
                old_state: state_label(old_state).to_string(),
                new_state: SessionState::Invalid.as_str().to_string(),
                reason: format!("ERROR_{error_code}: {reason}"),
                created_at: now,
            })
            .await?;
        warn!(ty_uid, error_code, reason, "session invalidated");
        Ok(())
    }

    /// Gate contract for senders: a send is authorized only while the
    /// session is active. Rejections carry a distinguishable reason and
    /// happen before any network attempt.
    pub async fn authorize(
        &self,
        ty_uid: &str,
    ) -> Result<std::result::Result<SessionRecord, Rejection>> {
        match self.store.get(ty_uid).await? {
            Some(record) if record.state == SessionState::Active => Ok(Ok(record)),
            Some(record) if record.invalid_reason.as_deref() == Some(REASON_CIRCUIT_BREAKER) => {
                Ok(Err(Rejection::CircuitBreakerOpen))
            },
            _ => Ok(Err(Rejection::SessionInactive)),
        }
    }

    /// Full transition history for an identity.
    pub async fn audit_trail(&self, ty_uid: &str) -> Result<Vec<AuditEntry>> {
        self.store.audit_trail(ty_uid).await
    }

    fn lock_for(&self, ty_uid: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(ty_uid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn state_label(state: Option<SessionState>) -> &'static str {
    match state {
        Some(s) => s.as_str(),
        None => "none",
    }
}

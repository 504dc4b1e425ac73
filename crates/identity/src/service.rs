//! Identity resolution over the durable shared store.
//!
//! All lookups are alias-aware: once an identity has been merged, every
//! mapping that pointed at it transparently redirects to the surviving
//! identity. Mapping rows themselves are never rewritten.

use {
    serde_json::Value,
    sqlx::SqlitePool,
    tracing::{info, warn},
    tybridge_common::{ActorType, now_ms},
    uuid::Uuid,
};

use crate::{
    error::{Error, Result},
    types::{CanonicalUser, DeliveryTarget, IdentityStatus, ResolvedIdentity},
};

/// Reserved provider namespace for cross-channel anchor values.
pub const ANCHOR_PROVIDER: &str = "anchor";

/// Metadata key carrying an anchor value on inbound profile metadata.
pub const ANCHOR_METADATA_KEY: &str = "anchor";

const MAX_ALIAS_HOPS: usize = 8;

#[derive(sqlx::FromRow)]
struct UserRow {
    ty_uid: String,
    handle: String,
    actor_type: String,
    status: String,
    tenant_id: String,
    created_at: i64,
    updated_at: i64,
}

impl From<UserRow> for CanonicalUser {
    fn from(r: UserRow) -> Self {
        Self {
            ty_uid: r.ty_uid,
            handle: r.handle,
            actor_type: r.actor_type.parse().unwrap_or_default(),
            status: IdentityStatus::parse(&r.status),
            tenant_id: r.tenant_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BindingRow {
    provider: String,
    external_key: String,
    is_verified: i64,
}

/// Converges external identifiers into canonical identities.
pub struct IdentityService {
    pool: SqlitePool,
}

impl IdentityService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve the canonical identity owning `(provider, external_key)`,
    /// creating it when no anchor or direct mapping matches.
    ///
    /// Returned `ty_uid` and `handle` are stable across calls regardless of
    /// metadata variation; refreshed metadata fields are merged
    /// opportunistically.
    pub async fn resolve_or_create(
        &self,
        provider: &str,
        external_key: &str,
        metadata: Value,
        tenant_id: &str,
    ) -> Result<ResolvedIdentity> {
        // 1. Anchor convergence: a known anchor value wins over everything.
        if let Some(anchor) = metadata.get(ANCHOR_METADATA_KEY).and_then(Value::as_str)
            && let Some(owner) = self.mapping_owner(ANCHOR_PROVIDER, anchor).await?
        {
            let target = self.canonical_uid(&owner).await?;
            // A pair already bound to a different identity cannot be silently
            // re-pointed; conflicting data is surfaced for operator merge.
            if let Some(bound) = self.mapping_owner(provider, external_key).await? {
                let bound = self.canonical_uid(&bound).await?;
                if bound != target {
                    warn!(
                        external_key,
                        bound_uid = %bound,
                        anchor_uid = %target,
                        "anchor and direct mapping disagree"
                    );
                    return Err(Error::conflict(bound));
                }
            } else {
                sqlx::query(
                    "INSERT INTO identities (provider, external_key, ty_uid, metadata, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(provider)
                .bind(external_key)
                .bind(&target)
                .bind(metadata.to_string())
                .bind(now_ms())
                .bind(now_ms())
                .execute(&self.pool)
                .await?;
                info!(external_key, ty_uid = %target, "auto-linked via anchor convergence");
                self.audit(&target, "linked", &format!("{provider}:{external_key} via anchor"))
                    .await?;
            }
            let nickname = self.refresh_metadata(provider, external_key, &metadata).await?;
            let user = self.require_user(&target).await?;
            return Ok(resolved(user, nickname, false));
        }

        // 2. Direct mapping lookup.
        if let Some(owner) = self.mapping_owner(provider, external_key).await? {
            let target = self.canonical_uid(&owner).await?;
            let nickname = self.refresh_metadata(provider, external_key, &metadata).await?;
            let user = self.require_user(&target).await?;
            return Ok(resolved(user, nickname, false));
        }

        // 3. No anchor, no mapping: found a new identity.
        match self
            .create(provider, external_key, &metadata, tenant_id, ActorType::Customer)
            .await
        {
            Ok(identity) => Ok(identity),
            // Lost a concurrent creation race on the mapping's primary key;
            // the winner's identity is authoritative.
            Err(Error::Sqlx(e)) if is_unique_violation(&e) => {
                warn!(provider, external_key, "creation race lost, resolving to winner");
                let owner = self
                    .mapping_owner(provider, external_key)
                    .await?
                    .ok_or_else(|| Error::message("mapping vanished after creation race"))?;
                let target = self.canonical_uid(&owner).await?;
                let nickname = self.refresh_metadata(provider, external_key, &metadata).await?;
                let user = self.require_user(&target).await?;
                Ok(resolved(user, nickname, false))
            },
            Err(e) => Err(e),
        }
    }

    /// Alias-aware lookup of an already-bound `(provider, external_key)`
    /// pair. Never creates and never touches stored metadata.
    pub async fn resolve_existing(
        &self,
        provider: &str,
        external_key: &str,
    ) -> Result<Option<ResolvedIdentity>> {
        let Some(owner) = self.mapping_owner(provider, external_key).await? else {
            return Ok(None);
        };
        let target = self.canonical_uid(&owner).await?;
        let user = self.require_user(&target).await?;
        let nickname = sqlx::query_scalar::<_, String>(
            "SELECT metadata FROM identities WHERE provider = ? AND external_key = ?",
        )
        .bind(provider)
        .bind(external_key)
        .fetch_optional(&self.pool)
        .await?
        .and_then(|raw| {
            serde_json::from_str::<Value>(&raw)
                .ok()?
                .get("nickname")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Ok(Some(resolved(user, nickname, false)))
    }

    /// Bind an additional external key to an existing identity.
    ///
    /// Idempotent when the key is already bound to the same identity; fails
    /// with [`Error::IdentityConflict`] when it is owned elsewhere.
    pub async fn link_identity(
        &self,
        ty_uid: &str,
        provider: &str,
        external_key: &str,
        is_verified: bool,
        metadata: Value,
    ) -> Result<()> {
        let canonical = self.canonical_uid(ty_uid).await?;
        self.require_user(&canonical).await?;

        if let Some(owner) = self.mapping_owner(provider, external_key).await? {
            let owner_canonical = self.canonical_uid(&owner).await?;
            if owner_canonical == canonical {
                if is_verified {
                    sqlx::query(
                        "UPDATE identities SET is_verified = 1, updated_at = ?
                         WHERE provider = ? AND external_key = ?",
                    )
                    .bind(now_ms())
                    .bind(provider)
                    .bind(external_key)
                    .execute(&self.pool)
                    .await?;
                }
                return Ok(());
            }
            return Err(Error::conflict(owner_canonical));
        }

        sqlx::query(
            "INSERT INTO identities (provider, external_key, ty_uid, is_verified, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(provider)
        .bind(external_key)
        .bind(&canonical)
        .bind(is_verified as i64)
        .bind(metadata.to_string())
        .bind(now_ms())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        self.audit(&canonical, "linked", &format!("{provider}:{external_key}"))
            .await?;
        Ok(())
    }

    /// Fold `from_uid` into `to_uid`.
    ///
    /// Appends an alias row and marks `from` merged; no mapping row is
    /// deleted or rewritten, so the merge history stays reconstructible.
    pub async fn merge_users(&self, from_uid: &str, to_uid: &str, reason: &str) -> Result<()> {
        self.require_user(from_uid).await?;
        self.require_user(to_uid).await?;

        let target = self.canonical_uid(to_uid).await?;
        if target == from_uid {
            return Err(Error::message(format!(
                "merge {from_uid} -> {to_uid} would create an alias cycle"
            )));
        }

        sqlx::query(
            "INSERT INTO user_alias (alias_uid, primary_uid, reason, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(alias_uid) DO NOTHING",
        )
        .bind(from_uid)
        .bind(&target)
        .bind(reason)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE users SET status = 'merged', updated_at = ? WHERE ty_uid = ?")
            .bind(now_ms())
            .bind(from_uid)
            .execute(&self.pool)
            .await?;

        info!(from_uid, to_uid = %target, reason, "identities merged");
        self.audit(&target, "merged", &format!("{from_uid} -> {target}: {reason}"))
            .await?;
        Ok(())
    }

    /// Best bound external address for an identity.
    ///
    /// Channels in `preferred_channels` are tried in order; remaining
    /// bindings fall back verified-first. Bindings owned by merged-in
    /// identities count.
    pub async fn resolve_delivery_target(
        &self,
        ty_uid: &str,
        preferred_channels: &[&str],
    ) -> Result<DeliveryTarget> {
        let canonical = self.canonical_uid(ty_uid).await?;
        let uids = self.identity_cluster(&canonical).await?;

        let mut bindings: Vec<BindingRow> = Vec::new();
        for uid in &uids {
            let rows = sqlx::query_as::<_, BindingRow>(
                "SELECT provider, external_key, is_verified FROM identities
                 WHERE ty_uid = ? AND provider != ?",
            )
            .bind(uid)
            .bind(ANCHOR_PROVIDER)
            .fetch_all(&self.pool)
            .await?;
            bindings.extend(rows);
        }

        for channel in preferred_channels {
            let mut candidates: Vec<&BindingRow> =
                bindings.iter().filter(|b| b.provider == *channel).collect();
            candidates.sort_by_key(|b| std::cmp::Reverse(b.is_verified));
            if let Some(best) = candidates.first() {
                return Ok(DeliveryTarget {
                    provider: best.provider.clone(),
                    external_key: best.external_key.clone(),
                });
            }
        }

        bindings.sort_by_key(|b| std::cmp::Reverse(b.is_verified));
        bindings
            .first()
            .map(|b| DeliveryTarget {
                provider: b.provider.clone(),
                external_key: b.external_key.clone(),
            })
            .ok_or_else(|| Error::not_found(ty_uid))
    }

    /// Pure read of a canonical identity record.
    pub async fn get_user(&self, ty_uid: &str) -> Result<Option<CanonicalUser>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE ty_uid = ?")
            .bind(ty_uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Follow alias redirects to the surviving identity.
    pub async fn canonical_uid(&self, ty_uid: &str) -> Result<String> {
        let mut current = ty_uid.to_string();
        for _ in 0..MAX_ALIAS_HOPS {
            let next = sqlx::query_scalar::<_, String>(
                "SELECT primary_uid FROM user_alias WHERE alias_uid = ?",
            )
            .bind(&current)
            .fetch_optional(&self.pool)
            .await?;
            match next {
                Some(uid) => current = uid,
                None => return Ok(current),
            }
        }
        warn!(ty_uid, "alias chain exceeded hop bound, using last hop");
        Ok(current)
    }

    // ── internals ───────────────────────────────────────────────────────

    async fn create(
        &self,
        provider: &str,
        external_key: &str,
        metadata: &Value,
        tenant_id: &str,
        actor_type: ActorType,
    ) -> Result<ResolvedIdentity> {
        let mut tx = self.pool.begin().await?;

        // Re-check under the transaction: a concurrent creator may have
        // inserted the mapping since the lookup outside.
        let existing = sqlx::query_scalar::<_, String>(
            "SELECT ty_uid FROM identities WHERE provider = ? AND external_key = ?",
        )
        .bind(provider)
        .bind(external_key)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(owner) = existing {
            tx.rollback().await?;
            let target = self.canonical_uid(&owner).await?;
            let nickname = self.refresh_metadata(provider, external_key, metadata).await?;
            let user = self.require_user(&target).await?;
            return Ok(resolved(user, nickname, false));
        }

        let seq = sqlx::query_scalar::<_, i64>(
            "INSERT INTO handle_seq (actor_type, next_seq) VALUES (?, 1)
             ON CONFLICT(actor_type) DO UPDATE SET next_seq = next_seq + 1
             RETURNING next_seq",
        )
        .bind(actor_type.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let ty_uid = new_ty_uid();
        let handle = format!("{}-{:06}", actor_type.handle_prefix(), seq);
        let now = now_ms();

        sqlx::query(
            "INSERT INTO users (ty_uid, handle, actor_type, status, tenant_id, created_at, updated_at)
             VALUES (?, ?, ?, 'active', ?, ?, ?)",
        )
        .bind(&ty_uid)
        .bind(&handle)
        .bind(actor_type.as_str())
        .bind(tenant_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO identities (provider, external_key, ty_uid, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(provider)
        .bind(external_key)
        .bind(&ty_uid)
        .bind(metadata.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Plant the anchor mapping so later channels converge automatically.
        if let Some(anchor) = metadata.get(ANCHOR_METADATA_KEY).and_then(Value::as_str) {
            sqlx::query(
                "INSERT INTO identities (provider, external_key, ty_uid, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(provider, external_key) DO NOTHING",
            )
            .bind(ANCHOR_PROVIDER)
            .bind(anchor)
            .bind(&ty_uid)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO identity_audit (ty_uid, event, detail, created_at)
             VALUES (?, 'created', ?, ?)",
        )
        .bind(&ty_uid)
        .bind(format!("{provider}:{external_key}"))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(ty_uid, handle, external_key, "founded new identity");

        let nickname = metadata
            .get("nickname")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(ResolvedIdentity {
            ty_uid,
            handle,
            actor_type,
            nickname,
            is_new: true,
        })
    }

    async fn mapping_owner(&self, provider: &str, external_key: &str) -> Result<Option<String>> {
        let owner = sqlx::query_scalar::<_, String>(
            "SELECT ty_uid FROM identities WHERE provider = ? AND external_key = ?",
        )
        .bind(provider)
        .bind(external_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(owner)
    }

    /// Merge refreshed metadata fields into the stored mapping row, never
    /// touching `ty_uid` or `handle`. Returns the effective nickname.
    async fn refresh_metadata(
        &self,
        provider: &str,
        external_key: &str,
        incoming: &Value,
    ) -> Result<Option<String>> {
        let stored = sqlx::query_scalar::<_, String>(
            "SELECT metadata FROM identities WHERE provider = ? AND external_key = ?",
        )
        .bind(provider)
        .bind(external_key)
        .fetch_optional(&self.pool)
        .await?;
        let Some(stored) = stored else {
            return Ok(incoming.get("nickname").and_then(Value::as_str).map(str::to_string));
        };

        let mut merged: Value = serde_json::from_str(&stored).unwrap_or_else(|_| Value::Object(Default::default()));
        let mut changed = false;
        if let (Some(target), Some(source)) = (merged.as_object_mut(), incoming.as_object()) {
            for (key, value) in source {
                if target.get(key) != Some(value) {
                    target.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
        }
        if changed {
            sqlx::query(
                "UPDATE identities SET metadata = ?, updated_at = ?
                 WHERE provider = ? AND external_key = ?",
            )
            .bind(merged.to_string())
            .bind(now_ms())
            .bind(provider)
            .bind(external_key)
            .execute(&self.pool)
            .await?;
        }
        Ok(merged.get("nickname").and_then(Value::as_str).map(str::to_string))
    }

    async fn require_user(&self, ty_uid: &str) -> Result<CanonicalUser> {
        self.get_user(ty_uid)
            .await?
            .ok_or_else(|| Error::unknown_user(ty_uid))
    }

    /// The canonical uid plus every uid transitively merged into it.
    async fn identity_cluster(&self, canonical: &str) -> Result<Vec<String>> {
        let mut uids = vec![canonical.to_string()];
        let mut frontier = vec![canonical.to_string()];
        while let Some(uid) = frontier.pop() {
            let aliases = sqlx::query_scalar::<_, String>(
                "SELECT alias_uid FROM user_alias WHERE primary_uid = ?",
            )
            .bind(&uid)
            .fetch_all(&self.pool)
            .await?;
            for alias in aliases {
                if !uids.contains(&alias) {
                    uids.push(alias.clone());
                    frontier.push(alias);
                }
            }
        }
        Ok(uids)
    }

    async fn audit(&self, ty_uid: &str, event: &str, detail: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO identity_audit (ty_uid, event, detail, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(ty_uid)
        .bind(event)
        .bind(detail)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn resolved(user: CanonicalUser, nickname: Option<String>, is_new: bool) -> ResolvedIdentity {
    ResolvedIdentity {
        ty_uid: user.ty_uid,
        handle: user.handle,
        actor_type: user.actor_type,
        nickname,
        is_new,
    }
}

fn new_ty_uid() -> String {
    format!("TYU_{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|db| db.is_unique_violation())
}

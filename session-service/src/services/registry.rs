//! Per-subject set of currently valid token IDs.
//!
//! Stored as one hash per subject, `jti -> exp`, so that `revoke_all` can
//! blacklist each member for exactly its remaining lifetime. The hash itself
//! expires no earlier than its longest-lived member plus the refresh window,
//! so tokens that are expired but still rotatable are retired too.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::services::fallback::{FallbackTable, StoreOperation};
use crate::services::revocation::RevocationList;
use crate::services::store::{KeySpace, SessionStore};
use crate::services::ServiceError;

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    keys: KeySpace,
    fallback: FallbackTable,
    revocations: RevocationList,
    refresh_window: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        keys: KeySpace,
        fallback: FallbackTable,
        revocations: RevocationList,
    ) -> Self {
        Self {
            store,
            keys,
            fallback,
            revocations,
            refresh_window: None,
        }
    }

    /// Keep members around for `window` past their expiry and close their
    /// rotation claim when they are retired.
    pub fn with_refresh_window(mut self, window: Option<Duration>) -> Self {
        self.refresh_window = window;
        self
    }

    fn window_seconds(&self) -> u64 {
        self.refresh_window.map_or(0, |w| w.as_secs())
    }

    /// Add a token to the subject's set. Re-registering the same token is a no-op.
    pub async fn register(
        &self,
        subject_id: &str,
        token_id: &str,
        ttl_seconds: u64,
    ) -> Result<(), ServiceError> {
        let key = self.keys.sessions(subject_id);
        let expires_at = Utc::now().timestamp() + ttl_seconds as i64;

        let result = self.store.hset(&key, token_id, &expires_at.to_string()).await;
        self.fallback
            .absorb(StoreOperation::RegistryWrite, result, ())?;

        // Only ever extend the set's lifetime
        let retain = ttl_seconds + self.window_seconds();
        let current = self.store.ttl(&key).await;
        let current = self
            .fallback
            .absorb(StoreOperation::RegistryWrite, current, None)?;
        if current.map_or(true, |remaining| remaining < retain) {
            let result = self.store.expire(&key, retain).await;
            self.fallback
                .absorb(StoreOperation::RegistryWrite, result, ())?;
        }

        tracing::debug!(subject_id = %subject_id, jti = %token_id, "Session registered");
        Ok(())
    }

    /// Blacklist every member for its remaining lifetime, then clear the set.
    ///
    /// The set is removed with a single delete, so a login that calls this
    /// before its own `register` can never leave the subject without a
    /// session. Returns the retired token IDs.
    pub async fn revoke_all(&self, subject_id: &str) -> Result<Vec<String>, ServiceError> {
        let key = self.keys.sessions(subject_id);

        let members = self.store.hgetall(&key).await;
        let members = self
            .fallback
            .absorb(StoreOperation::RegistryRevokeAll, members, Default::default())?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now().timestamp();
        let mut retired = Vec::with_capacity(members.len());
        for (token_id, expires_at) in members {
            match expires_at.parse::<i64>() {
                Ok(expires_at) => {
                    self.revocations.add(&token_id, expires_at - now).await?;
                    if self.refresh_window.is_some() {
                        let window_end = expires_at + self.window_seconds() as i64;
                        self.revocations
                            .close_rotation(&token_id, window_end - now)
                            .await?;
                    }
                }
                Err(_) => tracing::warn!(
                    subject_id = %subject_id,
                    jti = %token_id,
                    "Unreadable session expiry, dropping without blacklisting"
                ),
            }
            retired.push(token_id);
        }

        let result = self.store.del(&key).await;
        self.fallback
            .absorb(StoreOperation::RegistryRevokeAll, result, ())?;

        tracing::info!(
            subject_id = %subject_id,
            revoked = retired.len(),
            "Revoked all sessions for subject"
        );
        Ok(retired)
    }

    /// Remove one member. Returns false when the token was no longer in the
    /// set, i.e. something else retired it first; an unreachable store
    /// reports true.
    pub async fn unregister(&self, subject_id: &str, token_id: &str) -> Result<bool, ServiceError> {
        let result = self
            .store
            .hdel(&self.keys.sessions(subject_id), token_id)
            .await;
        self.fallback
            .absorb(StoreOperation::RegistryWrite, result, true)
    }

    /// Membership check for the gate. An unreachable store counts as a member
    /// unless the registry check is configured to fail closed.
    pub async fn contains(&self, subject_id: &str, token_id: &str) -> Result<bool, ServiceError> {
        let result = self
            .store
            .hexists(&self.keys.sessions(subject_id), token_id)
            .await;
        self.fallback
            .absorb(StoreOperation::RegistryCheck, result, true)
    }
}

use std::sync::Arc;

use crate::services::fallback::{FallbackTable, StoreOperation};
use crate::services::store::{KeySpace, SessionStore};
use crate::services::ServiceError;

const REVOKED_MARKER: &str = "revoked";
const RETIRED_MARKER: &str = "retired";

/// Blacklist of tokens invalidated before their natural expiry.
///
/// Each entry lives exactly as long as the token it blocks would have.
#[derive(Clone)]
pub struct RevocationList {
    store: Arc<dyn SessionStore>,
    keys: KeySpace,
    fallback: FallbackTable,
}

impl RevocationList {
    pub fn new(store: Arc<dyn SessionStore>, keys: KeySpace, fallback: FallbackTable) -> Self {
        Self {
            store,
            keys,
            fallback,
        }
    }

    /// Mark a token revoked for `remaining_seconds`. Already-expired tokens
    /// are skipped since signature checks reject them anyway.
    pub async fn add(&self, token_id: &str, remaining_seconds: i64) -> Result<(), ServiceError> {
        if remaining_seconds <= 0 {
            tracing::debug!(jti = %token_id, "Token already expired, not blacklisting");
            return Ok(());
        }

        let result = self
            .store
            .set_ex(
                &self.keys.revoked(token_id),
                REVOKED_MARKER,
                remaining_seconds as u64,
            )
            .await;
        self.fallback
            .absorb(StoreOperation::RevocationWrite, result, ())?;

        tracing::debug!(jti = %token_id, ttl = remaining_seconds, "Token revoked");
        Ok(())
    }

    /// Take the rotation claim on a retired token for the rest of its refresh
    /// window, so an expired token cannot be refreshed after its blacklist
    /// entry has lapsed.
    pub async fn close_rotation(
        &self,
        token_id: &str,
        window_seconds: i64,
    ) -> Result<(), ServiceError> {
        if window_seconds <= 0 {
            return Ok(());
        }

        let result = self
            .store
            .set_ex(
                &self.keys.rotating(token_id),
                RETIRED_MARKER,
                window_seconds as u64,
            )
            .await;
        self.fallback
            .absorb(StoreOperation::RevocationWrite, result, ())
    }

    pub async fn is_revoked(&self, token_id: &str) -> Result<bool, ServiceError> {
        let result = self.store.exists(&self.keys.revoked(token_id)).await;
        self.fallback
            .absorb(StoreOperation::RevocationCheck, result, false)
    }
}

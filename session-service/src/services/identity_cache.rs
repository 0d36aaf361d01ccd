use std::sync::Arc;

use crate::models::Identity;
use crate::services::fallback::{FallbackTable, StoreOperation};
use crate::services::store::{KeySpace, SessionStore, StoreError};
use crate::services::ServiceError;

/// Cache-aside identity snapshots keyed by (subject, token ID), so each
/// issued token sees exactly the snapshot taken when it was minted.
#[derive(Clone)]
pub struct IdentityCache {
    store: Arc<dyn SessionStore>,
    keys: KeySpace,
    fallback: FallbackTable,
}

impl IdentityCache {
    pub fn new(store: Arc<dyn SessionStore>, keys: KeySpace, fallback: FallbackTable) -> Self {
        Self {
            store,
            keys,
            fallback,
        }
    }

    /// A miss, an outage, and an unreadable entry all come back as `None`.
    pub async fn get(
        &self,
        subject_id: &str,
        token_id: &str,
    ) -> Result<Option<Identity>, ServiceError> {
        let key = self.keys.identity(subject_id, token_id);
        let result = match self.store.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str::<Identity>(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: key.clone(),
                    reason: e.to_string(),
                }),
            other => other.map(|_| None),
        };
        self.fallback.absorb(StoreOperation::CacheRead, result, None)
    }

    pub async fn set(
        &self,
        token_id: &str,
        identity: &Identity,
        ttl_seconds: u64,
    ) -> Result<(), ServiceError> {
        if ttl_seconds == 0 {
            return Ok(());
        }
        let raw = serde_json::to_string(identity)
            .map_err(|e| anyhow::anyhow!("Failed to serialize identity: {}", e))?;
        let result = self
            .store
            .set_ex(
                &self.keys.identity(&identity.subject_id, token_id),
                &raw,
                ttl_seconds,
            )
            .await;
        self.fallback.absorb(StoreOperation::CacheWrite, result, ())
    }

    pub async fn del(&self, subject_id: &str, token_id: &str) -> Result<(), ServiceError> {
        let result = self
            .store
            .del(&self.keys.identity(subject_id, token_id))
            .await;
        self.fallback.absorb(StoreOperation::CacheDelete, result, ())
    }
}

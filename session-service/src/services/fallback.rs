//! The single table deciding what happens when the session store cannot be
//! reached. Components never catch store errors themselves; they hand the
//! result to [`FallbackTable::absorb`] together with the value that stands in
//! for "store unreachable".

use crate::services::{metrics, store::StoreError, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Log, count, and continue with the operation's degraded default.
    FailOpen,
    /// Surface `StoreUnavailable` to the caller.
    FailClosed,
}

impl std::str::FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "open" | "fail_open" => Ok(FallbackPolicy::FailOpen),
            "closed" | "fail_closed" => Ok(FallbackPolicy::FailClosed),
            _ => Err(format!("Invalid fallback policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    RevocationCheck,
    RevocationWrite,
    RegistryCheck,
    RegistryWrite,
    RegistryRevokeAll,
    CacheRead,
    CacheWrite,
    CacheDelete,
    RotationClaim,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::RevocationCheck => "revocation_check",
            StoreOperation::RevocationWrite => "revocation_write",
            StoreOperation::RegistryCheck => "registry_check",
            StoreOperation::RegistryWrite => "registry_write",
            StoreOperation::RegistryRevokeAll => "registry_revoke_all",
            StoreOperation::CacheRead => "cache_read",
            StoreOperation::CacheWrite => "cache_write",
            StoreOperation::CacheDelete => "cache_delete",
            StoreOperation::RotationClaim => "rotation_claim",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackTable {
    revocation_check: FallbackPolicy,
    registry_check: FallbackPolicy,
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::new(FallbackPolicy::FailOpen, FallbackPolicy::FailOpen)
    }
}

impl FallbackTable {
    /// Only the two read checks on the authentication path are tunable;
    /// writes and cache traffic always fail open.
    pub fn new(revocation_check: FallbackPolicy, registry_check: FallbackPolicy) -> Self {
        Self {
            revocation_check,
            registry_check,
        }
    }

    pub fn policy(&self, operation: StoreOperation) -> FallbackPolicy {
        match operation {
            StoreOperation::RevocationCheck => self.revocation_check,
            StoreOperation::RegistryCheck => self.registry_check,
            StoreOperation::RevocationWrite
            | StoreOperation::RegistryWrite
            | StoreOperation::RegistryRevokeAll
            | StoreOperation::CacheRead
            | StoreOperation::CacheWrite
            | StoreOperation::CacheDelete
            | StoreOperation::RotationClaim => FallbackPolicy::FailOpen,
        }
    }

    /// Resolve a store result. On failure, either substitute `degraded` or
    /// return `StoreUnavailable`, according to the operation's policy.
    pub fn absorb<T>(
        &self,
        operation: StoreOperation,
        result: Result<T, StoreError>,
        degraded: T,
    ) -> Result<T, ServiceError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                metrics::record_store_fallback(operation.as_str());
                match self.policy(operation) {
                    FallbackPolicy::FailOpen => {
                        tracing::warn!(
                            operation = operation.as_str(),
                            error = %e,
                            "Session store unavailable, continuing degraded"
                        );
                        Ok(degraded)
                    }
                    FallbackPolicy::FailClosed => {
                        tracing::warn!(
                            operation = operation.as_str(),
                            error = %e,
                            "Session store unavailable, failing closed"
                        );
                        Err(ServiceError::StoreUnavailable(e.to_string()))
                    }
                }
            }
        }
    }
}

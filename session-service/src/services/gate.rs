//! Per-request verification pipeline.
//!
//! signature and expiry -> revocation list -> session registry -> identity
//! (cache, else claims). The first failing step decides the rejection reason.

use crate::config::SessionMode;
use crate::models::Identity;
use crate::services::identity_cache::IdentityCache;
use crate::services::issuer::{TokenClaims, TokenIssuer};
use crate::services::metrics;
use crate::services::registry::SessionRegistry;
use crate::services::revocation::RevocationList;
use crate::services::ServiceError;

/// The caller resolved by an accepted token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: Identity,
    pub claims: TokenClaims,
}

#[derive(Clone)]
pub struct VerificationGate {
    issuer: TokenIssuer,
    revocations: RevocationList,
    registry: SessionRegistry,
    cache: IdentityCache,
    mode: SessionMode,
}

/// Pull the token out of an `Authorization` header value. Anything other
/// than a non-empty `Bearer` credential counts as missing.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, ServiceError> {
    let value = header.ok_or(ServiceError::MissingCredentials)?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(ServiceError::MissingCredentials)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ServiceError::MissingCredentials);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(ServiceError::MissingCredentials);
    }
    Ok(token)
}

impl VerificationGate {
    pub fn new(
        issuer: TokenIssuer,
        revocations: RevocationList,
        registry: SessionRegistry,
        cache: IdentityCache,
        mode: SessionMode,
    ) -> Self {
        Self {
            issuer,
            revocations,
            registry,
            cache,
            mode,
        }
    }

    /// Run the full pipeline on a raw `Authorization` header value and record
    /// the decision.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Authenticated, ServiceError> {
        let result = match extract_bearer(header) {
            Ok(token) => self.verify_token(token).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(auth) => {
                metrics::record_gate_decision("accept", "ok");
                tracing::debug!(
                    subject_id = %auth.identity.subject_id,
                    jti = %auth.claims.jti,
                    "Token accepted"
                );
            }
            Err(e) if e.is_rejection() => {
                metrics::record_gate_decision("reject", e.reason_code());
                tracing::debug!(reason = e.reason_code(), "Token rejected");
            }
            Err(e) => {
                metrics::record_gate_decision("error", e.reason_code());
                tracing::warn!(error = %e, "Token verification could not complete");
            }
        }

        result
    }

    /// Steps 2-5 of the pipeline for an already extracted token.
    pub async fn verify_token(&self, token: &str) -> Result<Authenticated, ServiceError> {
        let claims = self.issuer.verify(token)?;

        if self.revocations.is_revoked(&claims.jti).await? {
            return Err(ServiceError::TokenRevoked);
        }

        if self.mode == SessionMode::SingleSession
            && !self.registry.contains(&claims.sub, &claims.jti).await?
        {
            return Err(ServiceError::SessionStale);
        }

        let identity = match self.cache.get(&claims.sub, &claims.jti).await? {
            Some(identity) => identity,
            None => claims.identity(),
        };

        Ok(Authenticated { identity, claims })
    }
}

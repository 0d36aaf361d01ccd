use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::models::{Identity, IdentityStatus, Role};
use crate::services::ServiceError;

/// Signs and verifies bearer tokens.
///
/// One primary secret signs; previous secrets are kept for verification only
/// so tokens minted before a secret rotation keep working until they expire.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_keys: Vec<DecodingKey>,
    issuer: String,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (account ID)
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token ID; keys the revocation list, the session registry, and the identity cache
    pub jti: String,
    pub iss: String,
}

impl TokenClaims {
    /// Seconds until expiry, negative once expired.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.exp - now.timestamp()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_seconds(now) <= 0
    }

    /// Identity reconstructed from the claims alone. Only active accounts are
    /// ever issued tokens, so the status is implied.
    pub fn identity(&self) -> Identity {
        Identity {
            subject_id: self.sub.clone(),
            email: self.email.clone(),
            role: self.role,
            status: IdentityStatus::Active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    pub fn ttl_seconds(&self) -> u64 {
        (self.expires_at - self.issued_at).num_seconds().max(0) as u64
    }
}

impl TokenIssuer {
    pub fn new(config: &TokenConfig) -> Result<Self, anyhow::Error> {
        if config.signing_secret.is_empty() {
            anyhow::bail!("Token signing secret must not be empty");
        }

        let decoding_keys = std::iter::once(&config.signing_secret)
            .chain(config.previous_secrets.iter())
            .filter(|secret| !secret.is_empty())
            .map(|secret| DecodingKey::from_secret(secret.as_bytes()))
            .collect::<Vec<_>>();

        tracing::info!(
            previous_secrets = config.previous_secrets.len(),
            "Token issuer initialized with HS256"
        );

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding_keys,
            issuer: config.issuer.clone(),
        })
    }

    pub fn issue(&self, identity: &Identity, ttl: Duration) -> Result<IssuedToken, ServiceError> {
        self.issue_at(identity, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        identity: &Identity,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, ServiceError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| anyhow::anyhow!("Token TTL out of range: {}", e))?;
        let expires_at = now + ttl;

        let claims = TokenClaims {
            sub: identity.subject_id.clone(),
            email: identity.email.clone(),
            role: identity.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            issued_at: now,
            expires_at,
        })
    }

    /// Validate signature and expiry.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, ServiceError> {
        self.decode_with(token, true)
    }

    /// Validate the signature only. Logout and refresh accept expired tokens.
    pub fn decode_allow_expired(&self, token: &str) -> Result<TokenClaims, ServiceError> {
        self.decode_with(token, false)
    }

    fn decode_with(&self, token: &str, validate_exp: bool) -> Result<TokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);

        let mut last_error = ServiceError::InvalidSignature;
        for key in &self.decoding_keys {
            match decode::<TokenClaims>(token, key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => match e.kind() {
                    // Try the next key; anything else is independent of the key
                    ErrorKind::InvalidSignature => last_error = ServiceError::InvalidSignature,
                    ErrorKind::ExpiredSignature => return Err(ServiceError::TokenExpired),
                    _ => {
                        tracing::debug!(error = %e, "Rejected undecodable token");
                        return Err(ServiceError::MalformedToken);
                    }
                },
            }
        }

        Err(last_error)
    }
}

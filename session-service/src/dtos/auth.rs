use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{PublicIdentity, Role};
use crate::services::{Introspection, SessionGrant};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

/// Returned by login and refresh.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Seconds until `access_token` expires
    #[schema(example = 3600)]
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
    pub user: PublicIdentity,
}

impl From<SessionGrant> for TokenResponse {
    fn from(grant: SessionGrant) -> Self {
        Self {
            expires_in: grant.token.ttl_seconds(),
            expires_at: grant.token.expires_at,
            access_token: grant.token.token,
            token_type: "Bearer".to_string(),
            user: grant.identity.public(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokedSessionsResponse {
    #[schema(example = 2)]
    pub revoked: usize,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IntrospectRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    #[schema(example = "eyJhbGciOiJIUzI1NiJ9...")]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntrospectResponse {
    #[schema(example = true)]
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Rejection reason when inactive
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "token_revoked")]
    pub reason: Option<String>,
}

impl From<Introspection> for IntrospectResponse {
    fn from(result: Introspection) -> Self {
        match result {
            Introspection::Active(auth) => Self {
                active: true,
                sub: Some(auth.identity.subject_id),
                email: Some(auth.identity.email),
                role: Some(auth.identity.role),
                exp: Some(auth.claims.exp),
                iat: Some(auth.claims.iat),
                jti: Some(auth.claims.jti),
                reason: None,
            },
            Introspection::Inactive(reason) => Self {
                active: false,
                sub: None,
                email: None,
                role: None,
                exp: None,
                iat: None,
                jti: None,
                reason: Some(reason.to_string()),
            },
        }
    }
}

/// Who the gate resolved for the current request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

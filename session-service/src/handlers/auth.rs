use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use service_core::error::AppError;

use crate::dtos::auth::{
    IntrospectRequest, IntrospectResponse, LoginRequest, MessageResponse,
    RevokedSessionsResponse, SessionResponse, TokenResponse,
};
use crate::middleware::{AuthUser, MaybeAuthUser};
use crate::utils::{Password, ValidatedJson};
use crate::AppState;

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Exchange email and password for a bearer token
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let grant = state
        .sessions
        .login(&req.email, &Password::new(req.password))
        .await?;
    Ok(Json(grant.into()))
}

/// Revoke the presented token. Expired tokens are accepted; repeats succeed.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Missing, malformed or forged token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    state.sessions.logout(authorization(&headers)).await?;
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// Rotate the presented token into a fresh one
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Token rotated", body = TokenResponse),
        (status = 401, description = "Token expired, revoked or invalid", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    let grant = state.sessions.refresh(authorization(&headers)).await?;
    Ok(Json(grant.into()))
}

/// Revoke every session of the caller
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "Sessions revoked", body = RevokedSessionsResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<RevokedSessionsResponse>, AppError> {
    let revoked = state.sessions.logout_all(&user.0).await?;
    Ok(Json(RevokedSessionsResponse { revoked }))
}

/// Report whether a token would currently pass the gate
#[utoipa::path(
    post,
    path = "/auth/introspect",
    request_body = IntrospectRequest,
    responses(
        (status = 200, description = "Token status returned", body = IntrospectResponse),
        (status = 503, description = "Session store unavailable", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn introspect(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<IntrospectRequest>,
) -> Result<Json<IntrospectResponse>, AppError> {
    let result = state.sessions.introspect(&req.token).await?;
    Ok(Json(result.into()))
}

/// Current session, if any. Never rejects.
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Session state", body = SessionResponse)
    ),
    tag = "Authentication"
)]
pub async fn session(MaybeAuthUser(auth): MaybeAuthUser) -> Json<SessionResponse> {
    Json(match auth {
        Some(auth) => SessionResponse {
            authenticated: true,
            user: Some(auth.identity.public()),
            expires_at: Some(auth.claims.exp),
        },
        None => SessionResponse {
            authenticated: false,
            user: None,
            expires_at: None,
        },
    })
}

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::convert::Infallible;

use crate::models::{Identity, Role};
use crate::services::{Authenticated, ServiceError};
use crate::AppState;

fn authorization(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Reject the request unless the gate accepts its bearer token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = authorization(&req);
    let auth = state.sessions.gate().authenticate(header.as_deref()).await?;

    // Store the caller in request extensions so handlers can access it
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

/// Attach the caller when the gate accepts, otherwise continue anonymously.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header = authorization(&req);
    if header.is_some() {
        match state.sessions.gate().authenticate(header.as_deref()).await {
            Ok(auth) => {
                req.extensions_mut().insert(auth);
            }
            Err(e) if e.is_rejection() => {}
            Err(e) => {
                tracing::warn!(error = %e, "Optional authentication skipped");
            }
        }
    }

    next.run(req).await
}

/// Caller accepted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub Authenticated);

impl AuthUser {
    pub fn identity(&self) -> &Identity {
        &self.0.identity
    }

    /// Coarse role check; higher roles include lower ones.
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.0.identity.role.satisfies(role) {
            Ok(())
        } else {
            tracing::warn!(
                subject_id = %self.0.identity.subject_id,
                role = %self.0.identity.role,
                required = %role,
                "Insufficient role"
            );
            Err(ServiceError::InsufficientRole.into())
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts.extensions.get::<Authenticated>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })?;

        Ok(AuthUser(auth.clone()))
    }
}

/// Caller attached by [`optional_auth`], if any.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<Authenticated>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(parts.extensions.get::<Authenticated>().cloned()))
    }
}

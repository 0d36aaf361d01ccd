use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::auth::RevokedSessionsResponse;
use crate::middleware::AuthUser;
use crate::models::Role;
use crate::AppState;

/// Revoke every session of a subject
#[utoipa::path(
    post,
    path = "/admin/subjects/{subject_id}/sessions/revoke",
    params(
        ("subject_id" = String, Path, description = "Subject whose sessions are revoked")
    ),
    responses(
        (status = 200, description = "Sessions revoked", body = RevokedSessionsResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn revoke_subject_sessions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(subject_id): Path<String>,
) -> Result<Json<RevokedSessionsResponse>, AppError> {
    user.require_role(Role::Admin)?;

    let revoked = state.sessions.revoke_subject(&subject_id).await?;
    tracing::info!(
        admin_id = %user.identity().subject_id,
        subject_id = %subject_id,
        revoked,
        "Admin revoked sessions"
    );
    Ok(Json(RevokedSessionsResponse { revoked }))
}

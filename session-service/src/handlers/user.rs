use axum::Json;

use crate::middleware::AuthUser;
use crate::models::PublicIdentity;

/// Identity of the authenticated caller
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user", body = PublicIdentity),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn get_me(user: AuthUser) -> Json<PublicIdentity> {
    Json(user.identity().public())
}

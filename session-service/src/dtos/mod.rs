pub mod auth;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body as rendered by `AppError`, for the OpenAPI document.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Authentication failed")]
    pub error: String,
    #[schema(example = "token_revoked")]
    pub code: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "session-service")]
    pub service: String,
    #[schema(example = "1.0.0")]
    pub version: String,
    #[schema(example = "ok")]
    pub store: String,
}

use service_core::error::AppError;
use thiserror::Error;

/// Generic text for every authentication failure; the `code` is the only
/// distinguishing detail a caller gets.
const AUTH_FAILED: &str = "Authentication failed";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Session superseded by a newer login")]
    SessionStale,

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Machine-readable rejection reason.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::AccountDisabled => "account_disabled",
            ServiceError::MissingCredentials => "missing_credentials",
            ServiceError::MalformedToken => "malformed_token",
            ServiceError::InvalidSignature => "invalid_signature",
            ServiceError::TokenExpired => "token_expired",
            ServiceError::TokenRevoked => "token_revoked",
            ServiceError::SessionStale => "stale_session",
            ServiceError::InsufficientRole => "insufficient_role",
            ServiceError::StoreUnavailable(_) => "store_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// True for the failures that mean "this caller is not authenticated".
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidCredentials
                | ServiceError::AccountDisabled
                | ServiceError::MissingCredentials
                | ServiceError::MalformedToken
                | ServiceError::InvalidSignature
                | ServiceError::TokenExpired
                | ServiceError::TokenRevoked
                | ServiceError::SessionStale
        )
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials | ServiceError::AccountDisabled => {
                AppError::unauthenticated(err.reason_code(), "Invalid email or password")
            }
            ServiceError::MissingCredentials
            | ServiceError::MalformedToken
            | ServiceError::InvalidSignature
            | ServiceError::TokenExpired
            | ServiceError::TokenRevoked
            | ServiceError::SessionStale => {
                AppError::unauthenticated(err.reason_code(), AUTH_FAILED)
            }
            ServiceError::InsufficientRole => {
                AppError::Forbidden(anyhow::anyhow!("Insufficient role"))
            }
            ServiceError::StoreUnavailable(reason) => AppError::ServiceUnavailable(reason),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

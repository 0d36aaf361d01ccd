pub mod auth;
pub mod metrics;

pub use auth::{optional_auth, require_auth, AuthUser, MaybeAuthUser};
pub use metrics::metrics_middleware;

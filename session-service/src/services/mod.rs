pub mod directory;
pub mod error;
pub mod fallback;
pub mod gate;
pub mod identity_cache;
pub mod issuer;
pub mod metrics;
pub mod registry;
pub mod revocation;
pub mod session;
pub mod store;

pub use directory::{CredentialValidator, IdentityDirectory, InMemoryDirectory};
pub use error::ServiceError;
pub use fallback::{FallbackPolicy, FallbackTable, StoreOperation};
pub use gate::{extract_bearer, Authenticated, VerificationGate};
pub use identity_cache::IdentityCache;
pub use issuer::{IssuedToken, TokenClaims, TokenIssuer};
pub use registry::SessionRegistry;
pub use revocation::RevocationList;
pub use session::{Introspection, SessionGrant, SessionPolicy, SessionService};
pub use store::{KeySpace, MemoryStore, RedisStore, SessionStore, StoreError};

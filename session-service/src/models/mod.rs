pub mod identity;

pub use identity::{Identity, IdentityStatus, PublicIdentity, Role};

//! Identity snapshot shared by the issuer, the identity cache, and the gate.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Coarse role tag carried in tokens. Ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    /// Whether this role is at least as privileged as `required`.
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Disabled,
}

/// Immutable snapshot of an account, captured at login or refresh.
///
/// Owned by the external identity store; this service only carries copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
    pub role: Role,
    pub status: IdentityStatus,
}

impl Identity {
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    pub fn public(&self) -> PublicIdentity {
        PublicIdentity::from(self)
    }
}

/// The only identity shape returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PublicIdentity {
    #[schema(example = "7f8d2a90-58a4-4c4b-9d0e-4f1b2c3d4e5f")]
    pub id: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    pub role: Role,
}

impl From<&Identity> for PublicIdentity {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.subject_id.clone(),
            email: identity.email.clone(),
            role: identity.role,
        }
    }
}

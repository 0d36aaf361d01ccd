//! Seams to the external account system.
//!
//! Password verification and account records live outside this service.
//! [`InMemoryDirectory`] stands in for them during development and tests.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::models::{Identity, IdentityStatus, Role};
use crate::services::ServiceError;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

/// Checks an account secret and returns the account's current snapshot.
///
/// Disabled accounts are still returned; the caller decides what to do
/// with them.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, email: &str, password: &Password) -> Result<Identity, ServiceError>;
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Bookkeeping hook after a successful login.
    async fn record_login(&self, subject_id: &str) -> Result<(), ServiceError>;
}

/// One account in a seed file. Exactly one of `password_hash` (PHC string)
/// or `password` must be present; plaintext is only accepted in development.
#[derive(Debug, Deserialize)]
pub struct SeedAccount {
    pub subject_id: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default = "default_status")]
    pub status: IdentityStatus,
    pub password_hash: Option<String>,
    pub password: Option<String>,
}

fn default_role() -> Role {
    Role::User
}

fn default_status() -> IdentityStatus {
    IdentityStatus::Active
}

struct Account {
    identity: Identity,
    password_hash: PasswordHashString,
    last_login: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct InMemoryDirectory {
    accounts: RwLock<HashMap<String, Account>>,
    /// Verified against when the email is unknown so both paths cost the same.
    dummy_hash: PasswordHashString,
}

impl InMemoryDirectory {
    pub fn new() -> Result<Self, anyhow::Error> {
        Ok(Self {
            accounts: RwLock::new(HashMap::new()),
            dummy_hash: hash_password(&Password::new(uuid::Uuid::new_v4().to_string()))?,
        })
    }

    /// Load accounts from a JSON array of [`SeedAccount`]s.
    pub fn from_seed_file(path: impl AsRef<Path>, allow_plaintext: bool) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read directory seed {}: {}", path.display(), e))?;
        let seed: Vec<SeedAccount> = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Failed to parse directory seed {}: {}", path.display(), e))?;

        let directory = Self::new()?;
        for account in seed {
            directory.insert_seed(account, allow_plaintext)?;
        }

        tracing::info!(
            path = %path.display(),
            accounts = directory.len(),
            "Directory seeded"
        );
        Ok(directory)
    }

    fn insert_seed(&self, account: SeedAccount, allow_plaintext: bool) -> Result<(), anyhow::Error> {
        let password_hash = match (account.password_hash, account.password) {
            (Some(hash), None) => PasswordHashString::parse(hash)?,
            (None, Some(plaintext)) if allow_plaintext => hash_password(&Password::new(plaintext))?,
            (None, Some(_)) => anyhow::bail!(
                "Seed account {} has a plaintext password, which is only allowed in dev",
                account.email
            ),
            _ => anyhow::bail!(
                "Seed account {} needs exactly one of password_hash or password",
                account.email
            ),
        };

        let identity = Identity {
            subject_id: account.subject_id,
            email: account.email,
            role: account.role,
            status: account.status,
        };
        self.insert(identity, password_hash)
    }

    pub fn insert(&self, identity: Identity, password_hash: PasswordHashString) -> Result<(), anyhow::Error> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| anyhow::anyhow!("Directory lock poisoned"))?;
        if accounts.contains_key(&identity.email.to_lowercase()) {
            anyhow::bail!("Duplicate account email: {}", identity.email);
        }
        accounts.insert(
            identity.email.to_lowercase(),
            Account {
                identity,
                password_hash,
                last_login: None,
            },
        );
        Ok(())
    }

    /// Hash `password` and add the account.
    pub fn add_account(&self, identity: Identity, password: &Password) -> Result<(), anyhow::Error> {
        self.insert(identity, hash_password(password)?)
    }

    /// Flip an account's status, e.g. to simulate an administrator disabling it.
    pub fn set_status(&self, email: &str, status: IdentityStatus) -> Result<(), anyhow::Error> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| anyhow::anyhow!("Directory lock poisoned"))?;
        let account = accounts
            .get_mut(&email.to_lowercase())
            .ok_or_else(|| anyhow::anyhow!("Unknown account: {}", email))?;
        account.identity.status = status;
        Ok(())
    }

    pub fn last_login(&self, subject_id: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        let accounts = self.accounts.read().ok()?;
        accounts
            .values()
            .find(|a| a.identity.subject_id == subject_id)
            .and_then(|a| a.last_login)
    }

    pub fn len(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialValidator for InMemoryDirectory {
    async fn validate(&self, email: &str, password: &Password) -> Result<Identity, ServiceError> {
        let found = {
            let accounts = self
                .accounts
                .read()
                .map_err(|_| anyhow::anyhow!("Directory lock poisoned"))?;
            accounts
                .get(&email.to_lowercase())
                .map(|a| (a.identity.clone(), a.password_hash.clone()))
        };

        let (identity, hash) = match found {
            Some((identity, hash)) => (Some(identity), hash),
            None => (None, self.dummy_hash.clone()),
        };

        // Argon2 is CPU-bound
        let password = password.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))??;

        match identity {
            Some(identity) if matches => Ok(identity),
            _ => Err(ServiceError::InvalidCredentials),
        }
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn record_login(&self, subject_id: &str) -> Result<(), ServiceError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| anyhow::anyhow!("Directory lock poisoned"))?;
        if let Some(account) = accounts
            .values_mut()
            .find(|a| a.identity.subject_id == subject_id)
        {
            account.last_login = Some(chrono::Utc::now());
        }
        Ok(())
    }
}

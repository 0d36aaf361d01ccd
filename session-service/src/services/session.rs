use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SessionMode;
use crate::models::Identity;
use crate::services::directory::{CredentialValidator, IdentityDirectory};
use crate::services::fallback::{FallbackTable, StoreOperation};
use crate::services::gate::{extract_bearer, Authenticated, VerificationGate};
use crate::services::identity_cache::IdentityCache;
use crate::services::issuer::{IssuedToken, TokenClaims, TokenIssuer};
use crate::services::registry::SessionRegistry;
use crate::services::revocation::RevocationList;
use crate::services::store::{KeySpace, SessionStore};
use crate::services::ServiceError;
use crate::utils::Password;

/// A freshly minted token and the identity it was minted for.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub token: IssuedToken,
    pub identity: Identity,
}

/// Outcome of introspecting a token without failing the request.
#[derive(Debug, Clone)]
pub enum Introspection {
    Active(Authenticated),
    Inactive(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub mode: SessionMode,
    pub access_ttl: Duration,
    pub refresh_ttl: Option<Duration>,
}

/// Login, logout, and rotation on top of the issuer and the three side tables.
#[derive(Clone)]
pub struct SessionService {
    issuer: TokenIssuer,
    gate: VerificationGate,
    revocations: RevocationList,
    registry: SessionRegistry,
    cache: IdentityCache,
    store: Arc<dyn SessionStore>,
    keys: KeySpace,
    fallback: FallbackTable,
    credentials: Arc<dyn CredentialValidator>,
    directory: Arc<dyn IdentityDirectory>,
    policy: SessionPolicy,
}

impl SessionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        issuer: TokenIssuer,
        gate: VerificationGate,
        revocations: RevocationList,
        registry: SessionRegistry,
        cache: IdentityCache,
        store: Arc<dyn SessionStore>,
        keys: KeySpace,
        fallback: FallbackTable,
        credentials: Arc<dyn CredentialValidator>,
        directory: Arc<dyn IdentityDirectory>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            issuer,
            gate,
            revocations,
            registry,
            cache,
            store,
            keys,
            fallback,
            credentials,
            directory,
            policy,
        }
    }

    pub fn gate(&self) -> &VerificationGate {
        &self.gate
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn single_session(&self) -> bool {
        self.policy.mode == SessionMode::SingleSession
    }

    pub async fn login(&self, email: &str, password: &Password) -> Result<SessionGrant, ServiceError> {
        let identity = self.credentials.validate(email, password).await?;

        if !identity.is_active() {
            tracing::warn!(subject_id = %identity.subject_id, "Login attempt on disabled account");
            return Err(ServiceError::AccountDisabled);
        }

        // Retire every earlier token before this login's own token exists
        if self.single_session() {
            self.retire_all(&identity.subject_id).await?;
        }

        let token = self.issuer.issue(&identity, self.policy.access_ttl)?;
        let ttl = token.ttl_seconds();

        self.cache.set(&token.jti, &identity, ttl).await?;
        if self.single_session() {
            self.registry
                .register(&identity.subject_id, &token.jti, ttl)
                .await?;
        }

        if let Err(e) = self.directory.record_login(&identity.subject_id).await {
            tracing::warn!(
                subject_id = %identity.subject_id,
                error = %e,
                "Failed to record login"
            );
        }

        tracing::info!(
            subject_id = %identity.subject_id,
            jti = %token.jti,
            "Login succeeded"
        );
        Ok(SessionGrant { token, identity })
    }

    /// Revoke the presented token. The token must be signed by us but may
    /// already be expired; repeating the call is harmless.
    pub async fn logout(&self, authorization: Option<&str>) -> Result<(), ServiceError> {
        let token = extract_bearer(authorization)?;
        let claims = self.issuer.decode_allow_expired(token)?;

        self.retire(&claims).await?;

        tracing::info!(subject_id = %claims.sub, jti = %claims.jti, "Logout");
        Ok(())
    }

    /// Exchange a token for a successor and retire the original. In
    /// single-session mode the original must still be registered when the
    /// swap completes, otherwise the successor is discarded.
    pub async fn refresh(&self, authorization: Option<&str>) -> Result<SessionGrant, ServiceError> {
        let token = extract_bearer(authorization)?;
        let claims = self.issuer.decode_allow_expired(token)?;
        let now = Utc::now();

        let window_end = self.refresh_window_end(&claims);
        if window_end <= now.timestamp() {
            return Err(ServiceError::TokenExpired);
        }

        if self.revocations.is_revoked(&claims.jti).await? {
            return Err(ServiceError::TokenRevoked);
        }

        // Only one rotation per token; the claim outlives the refresh window
        let claim_ttl = (window_end - now.timestamp()).max(1) as u64;
        let claimed = self
            .store
            .set_nx_ex(&self.keys.rotating(&claims.jti), &now.timestamp().to_string(), claim_ttl)
            .await;
        if !self
            .fallback
            .absorb(StoreOperation::RotationClaim, claimed, true)?
        {
            tracing::warn!(
                subject_id = %claims.sub,
                jti = %claims.jti,
                "Token already rotated or retired"
            );
            return Err(ServiceError::TokenRevoked);
        }

        let identity = match self.cache.get(&claims.sub, &claims.jti).await? {
            Some(identity) => identity,
            None => claims.identity(),
        };

        let successor = self.issuer.issue(&identity, self.policy.access_ttl)?;
        let ttl = successor.ttl_seconds();

        self.cache.set(&successor.jti, &identity, ttl).await?;
        self.cache.del(&claims.sub, &claims.jti).await?;
        self.revocations
            .add(&claims.jti, claims.remaining_seconds(now))
            .await?;
        if self.single_session() {
            // Register first so a concurrent login's clear also catches the successor
            self.registry
                .register(&claims.sub, &successor.jti, ttl)
                .await?;
            if !self.registry.unregister(&claims.sub, &claims.jti).await? {
                tracing::warn!(
                    subject_id = %claims.sub,
                    old_jti = %claims.jti,
                    jti = %successor.jti,
                    "Original session retired during rotation, discarding successor"
                );
                self.revocations.add(&successor.jti, ttl as i64).await?;
                self.cache.del(&claims.sub, &successor.jti).await?;
                self.registry.unregister(&claims.sub, &successor.jti).await?;
                return Err(ServiceError::SessionStale);
            }
        }

        tracing::info!(
            subject_id = %claims.sub,
            old_jti = %claims.jti,
            jti = %successor.jti,
            "Token rotated"
        );
        Ok(SessionGrant {
            token: successor,
            identity,
        })
    }

    /// Sign the caller out everywhere. Returns the number of tokens revoked.
    pub async fn logout_all(&self, caller: &Authenticated) -> Result<usize, ServiceError> {
        if !self.single_session() {
            // Nothing indexes the caller's other tokens
            self.retire(&caller.claims).await?;
            return Ok(1);
        }

        let revoked = self.retire_all(&caller.claims.sub).await?;
        tracing::info!(subject_id = %caller.claims.sub, revoked, "Logged out everywhere");
        Ok(revoked)
    }

    /// Administrative mass revocation for another subject.
    pub async fn revoke_subject(&self, subject_id: &str) -> Result<usize, ServiceError> {
        if !self.single_session() {
            tracing::warn!(
                subject_id = %subject_id,
                "Session index disabled in revocation-only mode, nothing revoked"
            );
            return Ok(0);
        }
        self.retire_all(subject_id).await
    }

    pub async fn introspect(&self, token: &str) -> Result<Introspection, ServiceError> {
        match self.gate.verify_token(token).await {
            Ok(auth) => Ok(Introspection::Active(auth)),
            Err(e) if e.is_rejection() => Ok(Introspection::Inactive(e.reason_code())),
            Err(e) => Err(e),
        }
    }

    /// Last instant (Unix seconds) at which `claims` may still be rotated.
    fn refresh_window_end(&self, claims: &TokenClaims) -> i64 {
        match self.policy.refresh_ttl {
            Some(window) => claims.exp.max(claims.iat + window.as_secs() as i64),
            None => claims.exp,
        }
    }

    async fn retire(&self, claims: &TokenClaims) -> Result<(), ServiceError> {
        let now = Utc::now();
        self.revocations
            .add(&claims.jti, claims.remaining_seconds(now))
            .await?;
        if self.policy.refresh_ttl.is_some() {
            self.revocations
                .close_rotation(&claims.jti, self.refresh_window_end(claims) - now.timestamp())
                .await?;
        }
        self.cache.del(&claims.sub, &claims.jti).await?;
        if self.single_session() {
            self.registry.unregister(&claims.sub, &claims.jti).await?;
        }
        Ok(())
    }

    async fn retire_all(&self, subject_id: &str) -> Result<usize, ServiceError> {
        let retired = self.registry.revoke_all(subject_id).await?;
        for token_id in &retired {
            self.cache.del(subject_id, token_id).await?;
        }
        Ok(retired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::models::{IdentityStatus, Role};
    use crate::services::directory::InMemoryDirectory;
    use crate::services::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    const PASSWORD: &str = "grace-password";

    struct Fixture {
        store: Arc<MemoryStore>,
        service: SessionService,
        issuer: TokenIssuer,
    }

    fn grace() -> Identity {
        Identity {
            subject_id: "u-grace".to_string(),
            email: "grace@example.com".to_string(),
            role: Role::User,
            status: IdentityStatus::Active,
        }
    }

    fn build(
        store: Arc<dyn SessionStore>,
        mode: SessionMode,
        refresh_ttl: Option<Duration>,
    ) -> (SessionService, TokenIssuer) {
        let keys = KeySpace::default();
        let fallback = FallbackTable::default();
        let issuer = TokenIssuer::new(&TokenConfig {
            signing_secret: "session-test-secret".to_string(),
            previous_secrets: vec![],
            issuer: "session-service".to_string(),
            access_ttl: Duration::from_secs(900),
            refresh_ttl,
        })
        .unwrap();

        let revocations = RevocationList::new(store.clone(), keys.clone(), fallback);
        let registry =
            SessionRegistry::new(store.clone(), keys.clone(), fallback, revocations.clone())
                .with_refresh_window(refresh_ttl);
        let cache = IdentityCache::new(store.clone(), keys.clone(), fallback);
        let gate = VerificationGate::new(
            issuer.clone(),
            revocations.clone(),
            registry.clone(),
            cache.clone(),
            mode,
        );

        let directory = Arc::new(InMemoryDirectory::new().unwrap());
        directory
            .add_account(grace(), &Password::new(PASSWORD))
            .unwrap();

        let service = SessionService::new(
            issuer.clone(),
            gate,
            revocations,
            registry,
            cache,
            store,
            keys,
            fallback,
            directory.clone(),
            directory,
            SessionPolicy {
                mode,
                access_ttl: Duration::from_secs(900),
                refresh_ttl,
            },
        );
        (service, issuer)
    }

    fn fixture(mode: SessionMode, refresh_ttl: Option<Duration>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let (service, issuer) = build(store.clone(), mode, refresh_ttl);
        Fixture {
            store,
            service,
            issuer,
        }
    }

    /// Expired thirty minutes ago after a one-minute life.
    fn stale_token(fx: &Fixture) -> IssuedToken {
        fx.issuer
            .issue_at(
                &grace(),
                Duration::from_secs(60),
                Utc::now() - chrono::Duration::minutes(31),
            )
            .unwrap()
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    async fn login(fx: &Fixture) -> SessionGrant {
        fx.service
            .login("grace@example.com", &Password::new(PASSWORD))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_login_supersedes_first() {
        let fx = fixture(SessionMode::SingleSession, None);
        let first = login(&fx).await;
        let second = login(&fx).await;

        let gate = fx.service.gate();
        assert!(matches!(
            gate.verify_token(&first.token.token).await,
            Err(ServiceError::TokenRevoked)
        ));
        assert!(gate.verify_token(&second.token.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_revocation_only_mode_keeps_earlier_tokens() {
        let fx = fixture(SessionMode::RevocationOnly, None);
        let first = login(&fx).await;
        let second = login(&fx).await;

        let gate = fx.service.gate();
        assert!(gate.verify_token(&first.token.token).await.is_ok());
        assert!(gate.verify_token(&second.token.token).await.is_ok());
        // The registry is never written
        assert!(!fx
            .store
            .exists(&KeySpace::default().sessions("u-grace"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let fx = fixture(SessionMode::SingleSession, None);
        let grant = login(&fx).await;
        let header = bearer(&grant.token.token);

        fx.service.logout(Some(&header)).await.unwrap();
        assert!(matches!(
            fx.service.gate().verify_token(&grant.token.token).await,
            Err(ServiceError::TokenRevoked)
        ));
        fx.service.logout(Some(&header)).await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_accepts_expired_but_not_forged_tokens() {
        let fx = fixture(SessionMode::SingleSession, None);
        let expired = fx
            .issuer
            .issue_at(
                &grace(),
                Duration::from_secs(60),
                Utc::now() - chrono::Duration::hours(1),
            )
            .unwrap();
        fx.service
            .logout(Some(&bearer(&expired.token)))
            .await
            .unwrap();

        assert!(matches!(
            fx.service.logout(Some("Bearer not-a-token")).await,
            Err(ServiceError::MalformedToken)
        ));
        assert!(matches!(
            fx.service.logout(None).await,
            Err(ServiceError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn test_refresh_retires_original() {
        let fx = fixture(SessionMode::SingleSession, None);
        let grant = login(&fx).await;
        let old_jti = grant.token.jti.clone();

        let next = fx
            .service
            .refresh(Some(&bearer(&grant.token.token)))
            .await
            .unwrap();
        assert_ne!(next.token.jti, old_jti);
        assert_eq!(next.identity, grace());

        let gate = fx.service.gate();
        assert!(matches!(
            gate.verify_token(&grant.token.token).await,
            Err(ServiceError::TokenRevoked)
        ));
        assert!(gate.verify_token(&next.token.token).await.is_ok());
        assert!(!fx
            .store
            .exists(&KeySpace::default().identity("u-grace", &old_jti))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_refresh_is_single_use() {
        let fx = fixture(SessionMode::SingleSession, None);
        let grant = login(&fx).await;
        let header = bearer(&grant.token.token);

        // Both racers pass the blacklist check before either writes to it
        fx.store
            .set_nx_ex(&KeySpace::default().rotating(&grant.token.jti), "x", 60)
            .await
            .unwrap();
        assert!(matches!(
            fx.service.refresh(Some(&header)).await,
            Err(ServiceError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_refresh_window_for_expired_tokens() {
        let stale = || {
            (
                Utc::now() - chrono::Duration::minutes(30),
                Duration::from_secs(60),
            )
        };

        let fx = fixture(SessionMode::RevocationOnly, None);
        let (issued_at, ttl) = stale();
        let expired = fx.issuer.issue_at(&grace(), ttl, issued_at).unwrap();
        assert!(matches!(
            fx.service.refresh(Some(&bearer(&expired.token))).await,
            Err(ServiceError::TokenExpired)
        ));

        let fx = fixture(
            SessionMode::RevocationOnly,
            Some(Duration::from_secs(3600)),
        );
        let (issued_at, ttl) = stale();
        let expired = fx.issuer.issue_at(&grace(), ttl, issued_at).unwrap();
        let header = bearer(&expired.token);
        assert!(fx.service.refresh(Some(&header)).await.is_ok());
        // The rotation claim blocks a replay inside the window
        assert!(matches!(
            fx.service.refresh(Some(&header)).await,
            Err(ServiceError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_logged_out_token_cannot_be_refreshed_inside_window() {
        for mode in [SessionMode::SingleSession, SessionMode::RevocationOnly] {
            let fx = fixture(mode, Some(Duration::from_secs(3600)));
            let stale = stale_token(&fx);
            let header = bearer(&stale.token);

            fx.service.logout(Some(&header)).await.unwrap();
            assert!(matches!(
                fx.service.refresh(Some(&header)).await,
                Err(ServiceError::TokenRevoked)
            ));
        }
    }

    #[tokio::test]
    async fn test_superseded_token_cannot_be_refreshed_inside_window() {
        let fx = fixture(SessionMode::SingleSession, Some(Duration::from_secs(3600)));
        let stale = stale_token(&fx);
        fx.store
            .hset(
                &KeySpace::default().sessions("u-grace"),
                &stale.jti,
                &stale.expires_at.timestamp().to_string(),
            )
            .await
            .unwrap();

        let current = login(&fx).await;
        assert!(matches!(
            fx.service.refresh(Some(&bearer(&stale.token))).await,
            Err(ServiceError::TokenRevoked)
        ));
        assert!(fx
            .service
            .gate()
            .verify_token(&current.token.token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_registered_stale_token_refreshes_inside_window() {
        let fx = fixture(SessionMode::SingleSession, Some(Duration::from_secs(3600)));
        let stale = stale_token(&fx);
        fx.store
            .hset(
                &KeySpace::default().sessions("u-grace"),
                &stale.jti,
                &stale.expires_at.timestamp().to_string(),
            )
            .await
            .unwrap();

        let next = fx
            .service
            .refresh(Some(&bearer(&stale.token)))
            .await
            .unwrap();
        assert!(fx
            .service
            .gate()
            .verify_token(&next.token.token)
            .await
            .is_ok());
    }

    /// Delegates to a `MemoryStore`, but parks the first rotation claim until
    /// the test lets it continue.
    struct ParkingStore {
        inner: MemoryStore,
        armed: AtomicBool,
        parked: Notify,
        resume: Notify,
    }

    impl ParkingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                armed: AtomicBool::new(false),
                parked: Notify::new(),
                resume: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl SessionStore for ParkingStore {
        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }

        async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError> {
            self.inner.set_ex(key, value, ttl_seconds).await
        }

        async fn set_nx_ex(
            &self,
            key: &str,
            value: &str,
            ttl_seconds: u64,
        ) -> Result<bool, StoreError> {
            let claimed = self.inner.set_nx_ex(key, value, ttl_seconds).await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.resume.notified().await;
            }
            claimed
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.exists(key).await
        }

        async fn del(&self, key: &str) -> Result<(), StoreError> {
            self.inner.del(key).await
        }

        async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
            self.inner.ttl(key).await
        }

        async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StoreError> {
            self.inner.expire(key, ttl_seconds).await
        }

        async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
            self.inner.hset(key, field, value).await
        }

        async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
            self.inner.hexists(key, field).await
        }

        async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
            self.inner.hdel(key, field).await
        }

        async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
            self.inner.hgetall(key).await
        }
    }

    #[tokio::test]
    async fn test_login_during_rotation_discards_successor() {
        let store = Arc::new(ParkingStore::new());
        let (service, _) = build(store.clone(), SessionMode::SingleSession, None);
        let original = service
            .login("grace@example.com", &Password::new(PASSWORD))
            .await
            .unwrap();

        // Park the refresh right after it wins the rotation claim
        store.armed.store(true, Ordering::SeqCst);
        let refreshing = tokio::spawn({
            let service = service.clone();
            let header = bearer(&original.token.token);
            async move { service.refresh(Some(&header)).await }
        });
        store.parked.notified().await;

        let winner = service
            .login("grace@example.com", &Password::new(PASSWORD))
            .await
            .unwrap();
        store.resume.notify_one();

        assert!(matches!(
            refreshing.await.unwrap(),
            Err(ServiceError::SessionStale)
        ));

        let gate = service.gate();
        assert!(gate.verify_token(&winner.token.token).await.is_ok());
        assert!(gate.verify_token(&original.token.token).await.is_err());

        // Only the winning login is left in the registry
        let members = store
            .inner
            .hgetall(&KeySpace::default().sessions("u-grace"))
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        assert!(members.contains_key(&winner.token.jti));
    }

    #[tokio::test]
    async fn test_disabled_account_cannot_login() {
        let fx = fixture(SessionMode::SingleSession, None);
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new().unwrap());
        let mut disabled = grace();
        disabled.status = IdentityStatus::Disabled;
        directory
            .add_account(disabled, &Password::new(PASSWORD))
            .unwrap();

        let keys = KeySpace::default();
        let fallback = FallbackTable::default();
        let revocations = RevocationList::new(store.clone(), keys.clone(), fallback);
        let registry =
            SessionRegistry::new(store.clone(), keys.clone(), fallback, revocations.clone());
        let cache = IdentityCache::new(store.clone(), keys.clone(), fallback);
        let service = SessionService::new(
            fx.issuer.clone(),
            fx.service.gate().clone(),
            revocations,
            registry,
            cache,
            store.clone(),
            keys,
            fallback,
            directory.clone(),
            directory,
            fx.service.policy(),
        );

        assert!(matches!(
            service
                .login("grace@example.com", &Password::new(PASSWORD))
                .await,
            Err(ServiceError::AccountDisabled)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_logout_all_and_admin_revoke() {
        let fx = fixture(SessionMode::SingleSession, None);
        let grant = login(&fx).await;
        let caller = fx
            .service
            .gate()
            .verify_token(&grant.token.token)
            .await
            .unwrap();

        assert_eq!(fx.service.logout_all(&caller).await.unwrap(), 1);
        assert!(fx
            .service
            .gate()
            .verify_token(&grant.token.token)
            .await
            .is_err());

        login(&fx).await;
        assert_eq!(fx.service.revoke_subject("u-grace").await.unwrap(), 1);
        assert_eq!(fx.service.revoke_subject("u-grace").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_introspect() {
        let fx = fixture(SessionMode::SingleSession, None);
        let grant = login(&fx).await;

        match fx.service.introspect(&grant.token.token).await.unwrap() {
            Introspection::Active(auth) => assert_eq!(auth.claims.jti, grant.token.jti),
            Introspection::Inactive(reason) => panic!("unexpected rejection: {}", reason),
        }
        assert!(matches!(
            fx.service.introspect("garbage").await.unwrap(),
            Introspection::Inactive("malformed_token")
        ));
    }

    #[tokio::test]
    async fn test_login_survives_store_outage() {
        let fx = fixture(SessionMode::SingleSession, None);
        let before = login(&fx).await;

        fx.store.set_available(false);
        let after = login(&fx).await;

        let gate = fx.service.gate();
        assert!(gate.verify_token(&before.token.token).await.is_ok());
        assert!(gate.verify_token(&after.token.token).await.is_ok());
    }
}

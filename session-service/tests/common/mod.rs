//! Shared setup for session-service integration tests.
//!
//! Every test drives the real router over an in-process store with an
//! outage switch, so no Redis is required.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use service_core::config::Config;
use session_service::{
    build_router,
    config::{
        DirectoryConfig, Environment, SecurityConfig, SessionConfig, SessionMode,
        SessionPolicyConfig, StoreBackend, StoreConfig, TokenConfig,
    },
    models::{Identity, IdentityStatus, Role},
    services::{FallbackPolicy, InMemoryDirectory, MemoryStore},
    utils::Password,
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub const ALICE: (&str, &str) = ("alice@example.com", "alice-password");
pub const BOB: (&str, &str) = ("bob@example.com", "bob-password");
pub const MALLORY: (&str, &str) = ("mallory@example.com", "mallory-password");

pub struct TestOptions {
    pub mode: SessionMode,
    pub revocation_check: FallbackPolicy,
    pub registry_check: FallbackPolicy,
    pub access_ttl: Duration,
    pub refresh_ttl: Option<Duration>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            mode: SessionMode::SingleSession,
            revocation_check: FallbackPolicy::FailOpen,
            registry_check: FallbackPolicy::FailOpen,
            access_ttl: Duration::from_secs(900),
            refresh_ttl: None,
        }
    }
}

pub fn test_config(options: &TestOptions) -> SessionConfig {
    SessionConfig {
        common: Config::default(),
        environment: Environment::Dev,
        service_name: "session-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        store: StoreConfig {
            backend: StoreBackend::Memory,
            redis_url: None,
            timeout: Duration::from_millis(250),
            key_prefix: "session".to_string(),
        },
        token: TokenConfig {
            signing_secret: TEST_SECRET.to_string(),
            previous_secrets: vec![],
            issuer: "session-service".to_string(),
            access_ttl: options.access_ttl,
            refresh_ttl: options.refresh_ttl,
        },
        session: SessionPolicyConfig {
            mode: options.mode,
            revocation_check: options.revocation_check,
            registry_check: options.registry_check,
        },
        directory: DirectoryConfig { seed_path: None },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

fn account(subject_id: &str, email: &str, role: Role, status: IdentityStatus) -> Identity {
    Identity {
        subject_id: subject_id.to_string(),
        email: email.to_string(),
        role,
        status,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<InMemoryDirectory>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new().expect("directory"));
        for (subject_id, (email, password), role, status) in [
            ("u-alice", ALICE, Role::Admin, IdentityStatus::Active),
            ("u-bob", BOB, Role::User, IdentityStatus::Active),
            ("u-mallory", MALLORY, Role::User, IdentityStatus::Disabled),
        ] {
            directory
                .add_account(
                    account(subject_id, email, role, status),
                    &Password::new(password),
                )
                .expect("seed account");
        }

        let state = AppState::new(
            test_config(&options),
            store.clone(),
            directory.clone(),
            directory.clone(),
        )
        .expect("app state");
        let router = build_router(state.clone());

        Self {
            router,
            state,
            store,
            directory,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).expect("request")).await
    }

    pub async fn login(&self, (email, password): (&str, &str)) -> TestResponse {
        self.post(
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Log in and return the access token, panicking on failure.
    pub async fn token_for(&self, credentials: (&str, &str)) -> String {
        let response = self.login(credentials).await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        response.body["access_token"]
            .as_str()
            .expect("access_token")
            .to_string()
    }

    /// Status of `GET /users/me`, the canonical gated route.
    pub async fn gate_status(&self, token: &str) -> (StatusCode, Value) {
        let response = self.get("/users/me", Some(token)).await;
        (response.status, response.body)
    }
}

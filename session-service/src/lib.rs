pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::middleware::{
    request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};

use crate::config::SessionConfig;
use crate::dtos::HealthResponse;
use crate::services::{
    CredentialValidator, FallbackTable, IdentityCache, IdentityDirectory, KeySpace,
    RevocationList, SessionPolicy, SessionRegistry, SessionService, SessionStore, TokenIssuer,
    VerificationGate,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::refresh,
        handlers::auth::logout_all,
        handlers::auth::introspect,
        handlers::auth::session,
        handlers::user::get_me,
        handlers::admin::revoke_subject_sessions,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::HealthResponse,
            dtos::auth::LoginRequest,
            dtos::auth::TokenResponse,
            dtos::auth::MessageResponse,
            dtos::auth::RevokedSessionsResponse,
            dtos::auth::IntrospectRequest,
            dtos::auth::IntrospectResponse,
            dtos::auth::SessionResponse,
            models::PublicIdentity,
            models::Role,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Token issuance, rotation and revocation"),
        (name = "User", description = "Authenticated caller"),
        (name = "Admin", description = "Administrative session control"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: SessionConfig,
    pub sessions: SessionService,
    pub store: Arc<dyn SessionStore>,
}

impl AppState {
    /// Wire every component around the one store handle.
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn SessionStore>,
        credentials: Arc<dyn CredentialValidator>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Result<Self, anyhow::Error> {
        let keys = KeySpace::new(config.store.key_prefix.clone());
        let fallback = FallbackTable::new(
            config.session.revocation_check,
            config.session.registry_check,
        );

        let issuer = TokenIssuer::new(&config.token)?;
        let revocations = RevocationList::new(store.clone(), keys.clone(), fallback);
        let registry =
            SessionRegistry::new(store.clone(), keys.clone(), fallback, revocations.clone())
                .with_refresh_window(config.token.refresh_ttl);
        let cache = IdentityCache::new(store.clone(), keys.clone(), fallback);
        let gate = VerificationGate::new(
            issuer.clone(),
            revocations.clone(),
            registry.clone(),
            cache.clone(),
            config.session.mode,
        );

        let sessions = SessionService::new(
            issuer,
            gate,
            revocations,
            registry,
            cache,
            store.clone(),
            keys,
            fallback,
            credentials,
            directory,
            SessionPolicy {
                mode: config.session.mode,
                access_ttl: config.token.access_ttl,
                refresh_ttl: config.token.refresh_ttl,
            },
        );

        tracing::info!(
            mode = ?config.session.mode,
            revocation_check = ?config.session.revocation_check,
            registry_check = ?config.session.registry_check,
            "Session components initialized"
        );

        Ok(Self {
            config,
            sessions,
            store,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/users/me", get(handlers::user::get_me))
        .route(
            "/admin/subjects/:subject_id/sessions/revoke",
            post(handlers::admin::revoke_subject_sessions),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let optional = Router::new()
        .route("/auth/session", get(handlers::auth::session))
        .layer(from_fn_with_state(state.clone(), middleware::optional_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/introspect", post(handlers::auth::introspect))
        .merge(protected)
        .merge(optional)
        .with_state(state.clone())
        // Add metrics middleware
        .layer(from_fn(middleware::metrics_middleware))
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(cors_layer(&state.config.security.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    // Dev convenience; production config refuses the wildcard
    if allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(AllowOrigin::any());
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    cors.allow_origin(origins)
}

/// Service health check. A store outage degrades the service but does not
/// take it down, so it is reported rather than failed.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_up = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Session store health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if store_up { "ok" } else { "degraded" }.to_string(),
        service: state.config.service_name.clone(),
        version: state.config.service_version.clone(),
        store: if store_up { "up" } else { "down" }.to_string(),
    })
}

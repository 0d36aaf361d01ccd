use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

use crate::services::fallback::FallbackPolicy;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreConfig,
    pub token: TokenConfig,
    pub session: SessionPolicyConfig,
    pub directory: DirectoryConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
    /// Upper bound for every single store round trip.
    pub timeout: Duration,
    pub key_prefix: String,
}

#[derive(Clone)]
pub struct TokenConfig {
    pub signing_secret: String,
    /// Retired secrets still accepted for verification during a key rollover.
    pub previous_secrets: Vec<String>,
    pub issuer: String,
    pub access_ttl: Duration,
    /// When set, an expired token stays rotatable until `iat + refresh_ttl`.
    pub refresh_ttl: Option<Duration>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("signing_secret", &"<redacted>")
            .field("previous_secrets", &self.previous_secrets.len())
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// How logins treat previously issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Every login retires the subject's earlier tokens; the gate requires
    /// registry membership.
    SingleSession,
    /// No session tracking; only explicit logout revokes a token.
    RevocationOnly,
}

#[derive(Debug, Clone)]
pub struct SessionPolicyConfig {
    pub mode: SessionMode,
    pub revocation_check: FallbackPolicy,
    pub registry_check: FallbackPolicy,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// JSON file of seeded accounts for the in-process directory.
    pub seed_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let backend = get_env("STORE_BACKEND", Some("redis"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let config = SessionConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("session-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: get_optional_env("OTEL_EXPORTER_OTLP_ENDPOINT"),
            store: StoreConfig {
                backend,
                redis_url: get_optional_env("REDIS_URL"),
                timeout: Duration::from_millis(
                    get_env("STORE_TIMEOUT_MS", Some("250"), false)?
                        .parse()
                        .map_err(|e: std::num::ParseIntError| {
                            AppError::ConfigError(anyhow::anyhow!(
                                "STORE_TIMEOUT_MS: {}",
                                e
                            ))
                        })?,
                ),
                key_prefix: get_env("STORE_KEY_PREFIX", Some("session"), false)?,
            },
            token: TokenConfig {
                signing_secret: get_env("TOKEN_SIGNING_SECRET", None, is_prod)?,
                previous_secrets: get_optional_env("TOKEN_PREVIOUS_SECRETS")
                    .map(|raw| {
                        raw.split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                issuer: get_env("TOKEN_ISSUER", Some("session-service"), false)?,
                access_ttl: parse_human_duration(
                    "ACCESS_TOKEN_TTL",
                    &get_env("ACCESS_TOKEN_TTL", Some("1h"), false)?,
                )?,
                refresh_ttl: get_optional_env("REFRESH_TOKEN_TTL")
                    .map(|raw| parse_human_duration("REFRESH_TOKEN_TTL", &raw))
                    .transpose()?,
            },
            session: SessionPolicyConfig {
                mode: get_env("SESSION_MODE", Some("single_session"), false)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                revocation_check: get_env("REVOCATION_CHECK_FALLBACK", Some("open"), false)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                registry_check: get_env("REGISTRY_CHECK_FALLBACK", Some("open"), false)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            directory: DirectoryConfig {
                seed_path: get_optional_env("DIRECTORY_SEED_PATH"),
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "APP__PORT must be greater than 0"
            )));
        }

        if self.token.signing_secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_SIGNING_SECRET must not be empty"
            )));
        }

        if self.token.access_ttl < Duration::from_secs(1) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_TTL must be at least one second"
            )));
        }

        if let Some(refresh_ttl) = self.token.refresh_ttl {
            if refresh_ttl <= self.token.access_ttl {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "REFRESH_TOKEN_TTL must be longer than ACCESS_TOKEN_TTL"
                )));
            }
        }

        if self.store.timeout.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_TIMEOUT_MS must be positive"
            )));
        }

        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REDIS_URL is required when STORE_BACKEND=redis"
            )));
        }

        // In production, ensure stricter validation
        if self.environment == Environment::Prod {
            if self.token.signing_secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "TOKEN_SIGNING_SECRET must be at least 32 bytes in production"
                )));
            }

            if self.store.backend == StoreBackend::Memory {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "STORE_BACKEND=memory is not allowed in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }

        Ok(())
    }
}

/// Parse a human duration such as `"15m"`, `"1h"` or `"7d"`.
pub fn parse_human_duration(key: &str, raw: &str) -> Result<Duration, AppError> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{} ({:?}): {}", key, raw, e)))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "single_session" | "single" => Ok(SessionMode::SingleSession),
            "revocation_only" | "blacklist_only" => Ok(SessionMode::RevocationOnly),
            _ => Err(format!("Invalid session mode: {}", s)),
        }
    }
}

//! Key-value store client shared by the revocation list, the session
//! registry, and the identity cache.
//!
//! One handle is built at start-up and injected everywhere. Every call is
//! bounded by the configured timeout; a timeout is reported exactly like an
//! unreachable server so callers apply one fallback rule to both.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, FromRedisValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError>;

    /// Set only if absent. Returns whether this call created the key.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64)
        -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Remaining lifetime in seconds; `None` when the key is missing or has
    /// no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StoreError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// True when the field was present.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;
}

/// Key layout under a configurable prefix.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn revoked(&self, token_id: &str) -> String {
        format!("{}:revoked:{}", self.prefix, token_id)
    }

    pub fn sessions(&self, subject_id: &str) -> String {
        format!("{}:sessions:{}", self.prefix, subject_id)
    }

    pub fn identity(&self, subject_id: &str, token_id: &str) -> String {
        format!("{}:identity:{}:{}", self.prefix, subject_id, token_id)
    }

    pub fn rotating(&self, token_id: &str) -> String {
        format!("{}:rotating:{}", self.prefix, token_id)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("session")
    }
}

#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    manager: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager reconnects on its own after the first handshake
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Connected to Redis");

        Ok(Self {
            _client: client,
            manager,
            timeout,
        })
    }

    async fn run<T: FromRedisValue + Send>(&self, cmd: redis::Cmd) -> Result<T, StoreError> {
        let mut conn = self.manager.clone();
        match tokio::time::timeout(self.timeout, cmd.query_async::<_, T>(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let _: String = self.run(redis::cmd("PING")).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_seconds);
        self.run(cmd).await
    }

    async fn set_nx_ex(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX").arg("EX").arg(ttl_seconds);
        let reply: Option<String> = self.run(cmd).await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let _: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        // -2: no such key, -1: no expiry
        let seconds: i64 = self.run(cmd).await?;
        Ok(u64::try_from(seconds).ok())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl_seconds);
        let _: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key).arg(field).arg(value);
        let _: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("HEXISTS");
        cmd.arg(key).arg(field);
        self.run(cmd).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(key).arg(field);
        let removed: i64 = self.run(cmd).await?;
        Ok(removed > 0)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.run(cmd).await
    }
}

/// In-process store with Redis-like expiry semantics, for development and
/// tests. `set_available(false)` simulates an outage.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    available: AtomicBool,
}

struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

enum MemoryValue {
    Str(String),
    Hash(HashMap<String, String>),
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of live keys, for assertions on cleanup.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the live entry map after purging expired keys.
    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, MemoryEntry>, Instant) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store mutex poisoned: {}", e)))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        f(&mut entries, now)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: "WRONGTYPE operation against a key holding the wrong kind of value".to_string(),
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.with_entries(|_, _| Ok(()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: MemoryValue::Str(value.to_string()),
                    expires_at: Some(now + Duration::from_secs(ttl_seconds)),
                },
            );
            Ok(())
        })
    }

    async fn set_nx_ex(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, StoreError> {
        self.with_entries(|entries, now| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: MemoryValue::Str(value.to_string()),
                    expires_at: Some(now + Duration::from_secs(ttl_seconds)),
                },
            );
            Ok(true)
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entries(|entries, _| match entries.get(key) {
            None => Ok(None),
            Some(MemoryEntry {
                value: MemoryValue::Str(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.with_entries(|entries, _| Ok(entries.contains_key(key)))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.with_entries(|entries, _| {
            entries.remove(key);
            Ok(())
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.with_entries(|entries, now| {
            Ok(entries
                .get(key)
                .and_then(|entry| entry.expires_at)
                .map(|at| {
                    // Redis rounds to the nearest second as well
                    let millis = at.saturating_duration_since(now).as_millis() as u64;
                    (millis + 500) / 1000
                }))
        })
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        self.with_entries(|entries, now| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(now + Duration::from_secs(ttl_seconds));
            }
            Ok(())
        })
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.with_entries(|entries, _| {
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| MemoryEntry {
                    value: MemoryValue::Hash(HashMap::new()),
                    expires_at: None,
                });
            match &mut entry.value {
                MemoryValue::Hash(map) => {
                    map.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                MemoryValue::Str(_) => Err(wrong_type(key)),
            }
        })
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.with_entries(|entries, _| match entries.get(key) {
            None => Ok(false),
            Some(MemoryEntry {
                value: MemoryValue::Hash(map),
                ..
            }) => Ok(map.contains_key(field)),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.with_entries(|entries, _| {
            let (removed, now_empty) = match entries.get_mut(key) {
                None => return Ok(false),
                Some(MemoryEntry {
                    value: MemoryValue::Hash(map),
                    ..
                }) => (map.remove(field).is_some(), map.is_empty()),
                Some(_) => return Err(wrong_type(key)),
            };
            // Redis drops a hash once its last field is gone
            if now_empty {
                entries.remove(key);
            }
            Ok(removed)
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.with_entries(|entries, _| match entries.get(key) {
            None => Ok(HashMap::new()),
            Some(MemoryEntry {
                value: MemoryValue::Hash(map),
                ..
            }) => Ok(map.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_ex_expires() {
        tokio::time::pause();
        let store = MemoryStore::new();

        store.set_ex("k", "v", 10).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.ttl("k").await.unwrap(), Some(10));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx_only_first_wins() {
        let store = MemoryStore::new();
        assert!(store.set_nx_ex("lock", "1", 30).await.unwrap());
        assert!(!store.set_nx_ex("lock", "1", 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_lifecycle() {
        let store = MemoryStore::new();
        store.hset("h", "a", "1").await.unwrap();
        store.hset("h", "b", "2").await.unwrap();
        assert!(store.hexists("h", "a").await.unwrap());
        assert_eq!(store.hgetall("h").await.unwrap().len(), 2);

        // Hashes are created without an expiry
        assert_eq!(store.ttl("h").await.unwrap(), None);
        store.expire("h", 60).await.unwrap();
        assert_eq!(store.ttl("h").await.unwrap(), Some(60));

        assert!(store.hdel("h", "a").await.unwrap());
        assert!(!store.hdel("h", "a").await.unwrap());
        assert!(store.hdel("h", "b").await.unwrap());
        assert!(!store.exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 10).await.unwrap();
        assert!(matches!(
            store.hset("k", "f", "v").await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_outage_fails_every_call() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 10).await.unwrap();
        store.set_available(false);

        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.get("k").await.is_err());
        assert!(store.hexists("h", "f").await.is_err());

        store.set_available(true);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_key_space_layout() {
        let keys = KeySpace::new("blog");
        assert_eq!(keys.revoked("j1"), "blog:revoked:j1");
        assert_eq!(keys.sessions("u1"), "blog:sessions:u1");
        assert_eq!(keys.identity("u1", "j1"), "blog:identity:u1:j1");
        assert_eq!(keys.rotating("j1"), "blog:rotating:j1");
    }

    #[tokio::test]
    #[ignore = "requires a Redis server at REDIS_URL"]
    async fn test_redis_store_round_trip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let store = RedisStore::connect(&url, Duration::from_millis(500))
            .await
            .expect("redis reachable");
        let key = format!("test:{}", uuid::Uuid::new_v4());

        store.ping().await.unwrap();
        store.hset(&key, "jti", "123").await.unwrap();
        assert!(store.hexists(&key, "jti").await.unwrap());
        store.expire(&key, 30).await.unwrap();
        assert!(store.ttl(&key).await.unwrap().unwrap() <= 30);
        store.del(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
    }
}

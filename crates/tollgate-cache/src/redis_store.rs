//! Redis billing session store
//!
//! Sessions are JSON values with a TTL. Per-call locks are `SET NX PX` keys
//! holding a random token; release deletes the key only if the token still
//! matches, so an expired lock taken over by another process is never
//! released by the old holder.

use crate::keys;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError, Script};
use std::time::{Duration, Instant};
use tollgate_core::{
    models::BillingSession,
    traits::{SessionGuard, SessionStore},
    AppError, AppResult,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Redis-backed session store shared between processes
#[derive(Clone)]
pub struct RedisSessionStore {
    manager: ConnectionManager,
    lock_timeout: Duration,
}

impl RedisSessionStore {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
    pub async fn new(url: &str, lock_timeout: Duration) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self {
            manager,
            lock_timeout,
        })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Convert RedisError to AppError
    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }

    async fn try_acquire(&self, key: &str, token: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(keys::SESSION_LOCK_TTL_MS)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(reply.is_some())
    }
}

struct RedisGuard {
    manager: ConnectionManager,
    key: String,
    token: String,
}

impl SessionGuard for RedisGuard {}

impl Drop for RedisGuard {
    fn drop(&mut self) {
        let mut conn = self.manager.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key, "No runtime to release session lock; it will expire");
            return;
        };

        handle.spawn(async move {
            let released: Result<i32, RedisError> = Script::new(RELEASE_LOCK_SCRIPT)
                .key(&key)
                .arg(&token)
                .invoke_async(&mut conn)
                .await;
            if let Err(e) = released {
                warn!(key, "Failed to release session lock: {}", e);
            }
        });
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, call_id: &str) -> AppResult<Option<BillingSession>> {
        let key = keys::billing_session_key(call_id);
        let mut conn = self.manager.clone();

        let result: Option<String> = conn.get(&key).await.map_err(Self::map_redis_error)?;

        match result {
            Some(json) => {
                let session = serde_json::from_str(&json).map_err(|e| {
                    error!("Failed to deserialize session {}: {}", key, e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, session: &BillingSession, ttl_secs: u64) -> AppResult<()> {
        let key = keys::billing_session_key(&session.call_id);
        debug!("SET {} (TTL: {}s)", key, ttl_secs);

        let json = serde_json::to_string(session).map_err(|e| {
            error!("Failed to serialize session {}: {}", key, e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;

        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .set_ex(&key, json, ttl_secs)
            .ignore()
            .sadd(keys::ACTIVE_SESSIONS_KEY, &session.call_id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(())
    }

    async fn delete(&self, call_id: &str) -> AppResult<bool> {
        let key = keys::billing_session_key(call_id);
        debug!("DEL {}", key);

        let mut conn = self.manager.clone();
        let (deleted, _): (i32, i32) = redis::pipe()
            .atomic()
            .del(&key)
            .srem(keys::ACTIVE_SESSIONS_KEY, call_id)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(deleted > 0)
    }

    async fn lock(&self, call_id: &str) -> AppResult<Box<dyn SessionGuard>> {
        let key = keys::session_lock_key(call_id);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.lock_timeout;

        loop {
            if self.try_acquire(&key, &token).await? {
                return Ok(Box::new(RedisGuard {
                    manager: self.manager.clone(),
                    key,
                    token,
                }));
            }
            if Instant::now() >= deadline {
                warn!(call_id, "Timed out waiting for billing session lock");
                return Err(AppError::LockTimeout(call_id.to_string()));
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }

    async fn active_call_ids(&self) -> AppResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn
            .smembers(keys::ACTIVE_SESSIONS_KEY)
            .await
            .map_err(Self::map_redis_error)?;

        // Sessions that expired by TTL leave a stale member behind
        let mut active = Vec::with_capacity(members.len());
        for call_id in members {
            let exists: bool = conn
                .exists(keys::billing_session_key(&call_id))
                .await
                .map_err(Self::map_redis_error)?;
            if exists {
                active.push(call_id);
            } else {
                let _: i32 = conn
                    .srem(keys::ACTIVE_SESSIONS_KEY, &call_id)
                    .await
                    .map_err(Self::map_redis_error)?;
            }
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tollgate_core::models::AccountType;
    use tollgate_core::IncrementConfig;

    async fn setup_store() -> RedisSessionStore {
        let store = RedisSessionStore::new("redis://127.0.0.1:6379", Duration::from_millis(200))
            .await
            .expect("Failed to connect to Redis");
        let mut conn = store.manager.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .expect("Failed to flush DB");
        store
    }

    fn session(call_id: &str) -> BillingSession {
        let now = Utc::now();
        BillingSession {
            call_id: call_id.to_string(),
            user_id: 1,
            destination: "442071234567".to_string(),
            account_type: AccountType::Postpaid,
            billing_config: IncrementConfig::PER_MINUTE,
            rate_per_minute: dec!(0.10),
            minimum_duration: 60,
            matched_prefix: "44".to_string(),
            current_cost: dec!(0.10),
            billable_duration: 60,
            periodic_check_count: 0,
            reserved_amount: dec!(0.10),
            low_balance_since: None,
            last_termination_attempt: None,
            start_time: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_put_get_delete() {
        let store = setup_store().await;
        store.put(&session("r1"), 60).await.unwrap();

        let loaded = store.get("r1").await.unwrap().unwrap();
        assert_eq!(loaded, session_with_times(&loaded));
        assert_eq!(store.active_call_ids().await.unwrap(), vec!["r1".to_string()]);

        assert!(store.delete("r1").await.unwrap());
        assert!(store.get("r1").await.unwrap().is_none());
        assert!(store.active_call_ids().await.unwrap().is_empty());
    }

    fn session_with_times(loaded: &BillingSession) -> BillingSession {
        BillingSession {
            start_time: loaded.start_time,
            updated_at: loaded.updated_at,
            ..session(&loaded.call_id)
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_lock_is_exclusive() {
        let store = setup_store().await;

        let held = store.lock("r2").await.unwrap();
        let err = store.lock("r2").await.err().unwrap();
        assert!(matches!(err, AppError::LockTimeout(_)));

        drop(held);
        // Release runs on a spawned task
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.lock("r2").await.is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_expired_session_leaves_active_set() {
        let store = setup_store().await;
        store.put(&session("r3"), 1).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(store.get("r3").await.unwrap().is_none());
        assert!(store.active_call_ids().await.unwrap().is_empty());
    }
}

//! Billing session stores for Tollgate
//!
//! Two implementations of the `SessionStore` trait from tollgate-core:
//!
//! - [`MemorySessionStore`]: a concurrent map with per-call async locks and
//!   TTL, for single-process deployments
//! - [`RedisSessionStore`]: Redis with `SET NX` per-call locks and an active
//!   session set, for several engine processes sharing state
//!
//! # Example
//!
//! ```no_run
//! use tollgate_cache::connect;
//! use tollgate_core::config::SessionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = connect(&SessionConfig::default()).await?;
//!     let active = store.active_call_ids().await?;
//!     println!("{} live sessions", active.len());
//!     Ok(())
//! }
//! ```

pub mod keys;
pub mod memory;
pub mod redis_store;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

use std::sync::Arc;
use std::time::Duration;
use tollgate_core::config::{SessionBackend, SessionConfig};
use tollgate_core::traits::SessionStore;
use tollgate_core::{AppError, AppResult};
use tracing::info;

/// Build the session store selected by `config.backend`
pub async fn connect(config: &SessionConfig) -> AppResult<Arc<dyn SessionStore>> {
    let lock_timeout = Duration::from_millis(config.lock_timeout_ms);

    match config.backend {
        SessionBackend::Memory => {
            info!("Using in-memory billing session store");
            Ok(Arc::new(MemorySessionStore::new(lock_timeout)))
        }
        SessionBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                AppError::Config("sessions.redis_url is required for the redis backend".to_string())
            })?;
            let store = RedisSessionStore::new(url, lock_timeout).await?;
            store.ping().await?;
            info!("Using Redis billing session store");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let store = connect(&SessionConfig::default()).await.unwrap();
        assert!(store.active_call_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redis_requires_url() {
        let config = SessionConfig {
            backend: SessionBackend::Redis,
            redis_url: None,
            ..Default::default()
        };
        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}

//! In-memory billing session store
//!
//! Sessions live in a `DashMap` with a per-entry deadline. Each call id has
//! its own async mutex, so read-modify-write on one call is serialized while
//! different calls proceed in parallel.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tollgate_core::{
    models::BillingSession,
    traits::{SessionGuard, SessionStore},
    AppError, AppResult,
};
use tracing::{debug, warn};

struct Entry {
    session: BillingSession,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Releases the call's mutex, then drops its map entry if nobody else wants it
struct MemoryGuard {
    guard: Option<OwnedMutexGuard<()>>,
    call_id: String,
    locks: Arc<LockMap>,
}

impl SessionGuard for MemoryGuard {}

impl Drop for MemoryGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone of the Arc, so their entry survives
        self.locks
            .remove_if(&self.call_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Single-process session store
pub struct MemorySessionStore {
    sessions: DashMap<String, Entry>,
    locks: Arc<LockMap>,
    lock_timeout: Duration,
}

impl MemorySessionStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            locks: Arc::new(DashMap::new()),
            lock_timeout,
        }
    }

    /// Drop expired sessions and locks nobody holds
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.sessions.len());

        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        if purged > 0 {
            debug!("Purged {} expired billing sessions", purged);
        }
        purged
    }

    /// Number of per-call lock entries currently tracked
    pub fn lock_entries(&self) -> usize {
        self.locks.len()
    }

    fn lock_for(&self, call_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, call_id: &str) -> AppResult<Option<BillingSession>> {
        let now = Instant::now();
        let expired = match self.sessions.get(call_id) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.session.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.sessions.remove_if(call_id, |_, entry| entry.is_expired(now));
            debug!(call_id, "Billing session expired");
        }
        Ok(None)
    }

    async fn put(&self, session: &BillingSession, ttl_secs: u64) -> AppResult<()> {
        self.sessions.insert(
            session.call_id.clone(),
            Entry {
                session: session.clone(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, call_id: &str) -> AppResult<bool> {
        let removed = self.sessions.remove(call_id).is_some();
        self.locks
            .remove_if(call_id, |_, lock| Arc::strong_count(lock) == 1);
        Ok(removed)
    }

    async fn lock(&self, call_id: &str) -> AppResult<Box<dyn SessionGuard>> {
        let lock = self.lock_for(call_id);
        match tokio::time::timeout(self.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(Box::new(MemoryGuard {
                guard: Some(guard),
                call_id: call_id.to_string(),
                locks: self.locks.clone(),
            })),
            Err(_) => {
                self.locks
                    .remove_if(call_id, |_, lock| Arc::strong_count(lock) == 1);
                warn!(call_id, "Timed out waiting for billing session lock");
                Err(AppError::LockTimeout(call_id.to_string()))
            }
        }
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        Ok(self.sweep())
    }

    async fn active_call_ids(&self) -> AppResult<Vec<String>> {
        self.sweep();
        Ok(self.sessions.iter().map(|e| e.key().clone()).collect())
    }
}

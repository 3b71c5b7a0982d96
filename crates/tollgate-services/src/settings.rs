//! Operator settings provider
//!
//! Settings live in the `billing_settings` key/value table and change rarely,
//! so they are read through a TTL cache. Writers call `invalidate()` (or go
//! through [`CachedSettingsProvider::update`]) so the next read sees the new
//! values immediately.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tollgate_core::{traits::SettingsRepository, AppResult, BillingSettings};
use tracing::{debug, instrument, warn};

/// Source of the effective operator settings
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Current settings; never fails, falling back to defaults
    async fn current(&self) -> BillingSettings;

    /// Force the next read to go to the store
    fn invalidate(&self);
}

struct Snapshot {
    settings: BillingSettings,
    loaded_at: Instant,
    stale: bool,
}

/// Settings read from a repository and cached for `ttl`
pub struct CachedSettingsProvider {
    repo: Arc<dyn SettingsRepository>,
    defaults: BillingSettings,
    ttl: Duration,
    cached: RwLock<Option<Snapshot>>,
}

impl CachedSettingsProvider {
    pub fn new(repo: Arc<dyn SettingsRepository>, defaults: BillingSettings, ttl: Duration) -> Self {
        Self {
            repo,
            defaults,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Persist one setting and invalidate the cache
    #[instrument(skip(self))]
    pub async fn update(&self, key: &str, value: &str) -> AppResult<()> {
        self.repo.set(key, value).await?;
        self.invalidate();
        Ok(())
    }

    fn fresh(&self) -> Option<BillingSettings> {
        let cached = self.cached.read();
        cached
            .as_ref()
            .filter(|s| !s.stale && s.loaded_at.elapsed() < self.ttl)
            .map(|s| s.settings.clone())
    }
}

#[async_trait]
impl SettingsProvider for CachedSettingsProvider {
    async fn current(&self) -> BillingSettings {
        if let Some(settings) = self.fresh() {
            return settings;
        }

        match self.repo.load_all().await {
            Ok(values) => {
                let settings = self.defaults.clone().with_overrides(&values);
                debug!(?settings, "Loaded operator settings");
                *self.cached.write() = Some(Snapshot {
                    settings: settings.clone(),
                    loaded_at: Instant::now(),
                    stale: false,
                });
                settings
            }
            Err(e) => {
                // Serve the last known values rather than flip behaviour mid-call
                warn!("Failed to load operator settings: {}", e);
                self.cached
                    .read()
                    .as_ref()
                    .map(|s| s.settings.clone())
                    .unwrap_or_else(|| self.defaults.clone())
            }
        }
    }

    fn invalidate(&self) {
        if let Some(snapshot) = self.cached.write().as_mut() {
            snapshot.stale = true;
        }
        debug!("Operator settings cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tollgate_core::settings::keys;
    use tollgate_core::{AppError, IncrementConfig};

    #[derive(Default)]
    struct MapRepo {
        values: parking_lot::Mutex<HashMap<String, String>>,
        fail: std::sync::atomic::AtomicBool,
        loads: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SettingsRepository for MapRepo {
        async fn load_all(&self) -> AppResult<HashMap<String, String>> {
            self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(AppError::Database("down".into()));
            }
            Ok(self.values.lock().clone())
        }

        async fn set(&self, key: &str, value: &str) -> AppResult<()> {
            self.values.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    fn provider(repo: Arc<MapRepo>) -> CachedSettingsProvider {
        CachedSettingsProvider::new(repo, BillingSettings::default(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_overrides_and_cache() {
        let repo = Arc::new(MapRepo::default());
        repo.set(keys::GRACE_PERIOD_SECONDS, "30").await.unwrap();
        let provider = provider(repo.clone());

        assert_eq!(provider.current().await.grace_period_seconds, 30);
        assert_eq!(provider.current().await.grace_period_seconds, 30);
        assert_eq!(repo.loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_invalidates() {
        let repo = Arc::new(MapRepo::default());
        let provider = provider(repo.clone());
        assert_eq!(
            provider.current().await.default_billing_increment,
            IncrementConfig::SIX_SECOND
        );

        provider
            .update(keys::DEFAULT_BILLING_INCREMENT, "60/60")
            .await
            .unwrap();
        assert_eq!(
            provider.current().await.default_billing_increment,
            IncrementConfig::PER_MINUTE
        );
    }

    #[tokio::test]
    async fn test_store_failure_falls_back() {
        let repo = Arc::new(MapRepo::default());
        repo.set(keys::REAL_TIME_BILLING_ENABLED, "false").await.unwrap();
        let provider = provider(repo.clone());
        assert!(!provider.current().await.real_time_billing_enabled);

        repo.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        provider.invalidate();
        // Last known values are kept
        assert!(!provider.current().await.real_time_billing_enabled);

        let cold = CachedSettingsProvider::new(repo, BillingSettings::default(), Duration::from_secs(60));
        assert_eq!(cold.current().await, BillingSettings::default());
    }
}

//! Rate resolution
//!
//! Destination-specific rates win over country rates; within a tier the
//! longest matching prefix wins. Successful resolutions are cached in memory
//! per normalized destination for a short time. Misses are not cached, so a
//! newly added rate is picked up on the next call.

use crate::settings::SettingsProvider;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tollgate_core::{
    models::{Rate, RateTier},
    traits::RateRepository,
    AppError, AppResult, IncrementConfig,
};
use tracing::{debug, instrument, warn};

/// Tiers in lookup order
const TIERS: [RateTier; 2] = [RateTier::Destination, RateTier::Country];

/// A rate together with its effective increment
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRate {
    pub rate: Rate,
    pub billing_config: IncrementConfig,
}

/// Rate resolver with a short-lived lookup cache
pub struct RateResolver {
    repo: Arc<dyn RateRepository>,
    settings: Arc<dyn SettingsProvider>,
    ttl: Duration,
    cache: RwLock<HashMap<String, (ResolvedRate, Instant)>>,
}

impl RateResolver {
    pub fn new(
        repo: Arc<dyn RateRepository>,
        settings: Arc<dyn SettingsProvider>,
        ttl: Duration,
    ) -> Self {
        Self {
            repo,
            settings,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Find the rate for a destination
    ///
    /// # Errors
    ///
    /// `RateNotFound` when neither tier has a matching effective rate.
    #[instrument(skip(self))]
    pub async fn resolve(&self, destination: &str) -> AppResult<ResolvedRate> {
        let normalized = Rate::normalize_destination(destination);
        if normalized.is_empty() {
            warn!("Empty destination after normalization: {}", destination);
            return Err(AppError::RateNotFound(destination.to_string()));
        }

        if let Some(resolved) = self.cached(&normalized) {
            debug!("Rate cache HIT for destination: {}", normalized);
            return Ok(resolved);
        }

        let now = Utc::now();
        for tier in TIERS {
            if let Some(rate) = self.repo.find_by_destination(tier, &normalized, now).await? {
                debug!(
                    tier = %tier,
                    prefix = %rate.destination_prefix,
                    "Matched rate {}/min",
                    rate.rate_per_minute
                );
                let billing_config = self.increment_for(&rate).await;
                let resolved = ResolvedRate {
                    rate,
                    billing_config,
                };
                self.cache
                    .write()
                    .insert(normalized, (resolved.clone(), Instant::now()));
                return Ok(resolved);
            }
        }

        warn!("No rate found for destination: {}", normalized);
        Err(AppError::RateNotFound(normalized))
    }

    /// Increment config for a destination
    pub async fn resolve_billing_config(&self, destination: &str) -> AppResult<IncrementConfig> {
        Ok(self.resolve(destination).await?.billing_config)
    }

    /// Clear the lookup cache
    pub fn invalidate(&self) {
        self.cache.write().clear();
    }

    fn cached(&self, normalized: &str) -> Option<ResolvedRate> {
        let cache = self.cache.read();
        cache
            .get(normalized)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(resolved, _)| resolved.clone())
    }

    /// The rate's own increment, or the operator default if absent or malformed
    async fn increment_for(&self, rate: &Rate) -> IncrementConfig {
        let raw = match rate.billing_increment.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return self.settings.current().await.default_billing_increment,
        };

        match IncrementConfig::parse_or_preset(raw) {
            Ok(config) => config,
            Err(e) => {
                let fallback = self.settings.current().await.default_billing_increment;
                warn!(
                    prefix = %rate.destination_prefix,
                    "{}, using default {}",
                    e,
                    fallback
                );
                fallback
            }
        }
    }
}

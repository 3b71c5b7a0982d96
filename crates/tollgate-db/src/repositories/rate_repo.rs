//! Rate repository implementation
//!
//! Provides PostgreSQL-backed storage for both rate tiers with
//! Longest Prefix Match (LPM) lookups. Destination rates live in
//! `call_rates`, country rates in `country_rates`; both share one shape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tollgate_core::{
    models::{Rate, RateTier},
    traits::RateRepository,
    AppError, AppResult,
};
use tracing::{debug, error, instrument, warn};

const RATE_COLUMNS: &str = "id, destination_prefix, destination_name, rate_per_minute, \
     minimum_duration, billing_increment, effective_date, active, created_at, updated_at";

/// PostgreSQL implementation of RateRepository
pub struct PgRateRepository {
    pool: PgPool,
}

impl PgRateRepository {
    /// Create a new rate repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn table(tier: RateTier) -> &'static str {
        match tier {
            RateTier::Destination => "call_rates",
            RateTier::Country => "country_rates",
        }
    }
}

#[async_trait]
impl RateRepository for PgRateRepository {
    #[instrument(skip(self))]
    async fn find_by_destination(
        &self,
        tier: RateTier,
        destination: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rate>> {
        debug!("Finding {} rate for destination: {}", tier, destination);

        // Generate all possible prefixes from longest to shortest
        let prefixes = Rate::generate_prefixes(destination);

        if prefixes.is_empty() {
            warn!("No prefixes generated for destination: {}", destination);
            return Ok(None);
        }

        // The longest matching prefix wins, then the most recent effective date
        let query = format!(
            r#"
            SELECT {}
            FROM {}
            WHERE destination_prefix = ANY($1)
                AND active
                AND effective_date <= $2
            ORDER BY
                LENGTH(destination_prefix) DESC,
                effective_date DESC
            LIMIT 1
            "#,
            RATE_COLUMNS,
            Self::table(tier)
        );

        let result = sqlx::query_as::<sqlx::Postgres, RateRow>(&query)
            .bind(&prefixes)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    "Database error finding rate for destination {}: {}",
                    destination, e
                );
                AppError::Database(format!("Failed to find rate: {}", e))
            })?;

        if result.is_none() {
            debug!("No {} rate found for destination: {}", tier, destination);
        }

        Ok(result.map(|row| row.into_rate(tier)))
    }

    #[instrument(skip(self, rate), fields(prefix = %rate.destination_prefix))]
    async fn create(&self, rate: &Rate) -> AppResult<Rate> {
        debug!("Creating {} rate", rate.tier);

        let prefix = Rate::normalize_destination(&rate.destination_prefix);
        if prefix.is_empty() {
            return Err(AppError::Validation(
                "destination_prefix must contain digits".to_string(),
            ));
        }

        let query = format!(
            r#"
            INSERT INTO {} (
                destination_prefix, destination_name, rate_per_minute,
                minimum_duration, billing_increment, effective_date, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            Self::table(rate.tier),
            RATE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, RateRow>(&query)
            .bind(&prefix)
            .bind(&rate.destination_name)
            .bind(rate.rate_per_minute)
            .bind(rate.minimum_duration)
            .bind(&rate.billing_increment)
            .bind(rate.effective_date)
            .bind(rate.active)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating rate: {}", e);
                AppError::Database(format!("Failed to create rate: {}", e))
            })?;

        Ok(row.into_rate(rate.tier))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    id: i64,
    destination_prefix: String,
    destination_name: Option<String>,
    rate_per_minute: Decimal,
    minimum_duration: i64,
    billing_increment: Option<String>,
    effective_date: DateTime<Utc>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RateRow {
    fn into_rate(self, tier: RateTier) -> Rate {
        Rate {
            id: self.id,
            tier,
            destination_prefix: self.destination_prefix,
            destination_name: self.destination_name,
            rate_per_minute: self.rate_per_minute,
            minimum_duration: self.minimum_duration,
            billing_increment: self.billing_increment,
            effective_date: self.effective_date,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_tables() {
        assert_eq!(PgRateRepository::table(RateTier::Destination), "call_rates");
        assert_eq!(PgRateRepository::table(RateTier::Country), "country_rates");
    }

    #[test]
    fn test_row_keeps_tier() {
        let now = Utc::now();
        let row = RateRow {
            id: 3,
            destination_prefix: "44".to_string(),
            destination_name: Some("United Kingdom".to_string()),
            rate_per_minute: Decimal::new(12, 2),
            minimum_duration: 0,
            billing_increment: Some("60/60".to_string()),
            effective_date: now,
            active: true,
            created_at: now,
            updated_at: now,
        };

        let rate = row.into_rate(RateTier::Country);
        assert_eq!(rate.tier, RateTier::Country);
        assert_eq!(rate.destination_prefix, "44");
        assert_eq!(rate.billing_increment.as_deref(), Some("60/60"));
    }
}

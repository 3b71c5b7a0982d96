//! Operator settings repository
//!
//! Plain key/value rows in `billing_settings`. Parsing and defaults live
//! in `tollgate_core::settings`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tollgate_core::{traits::SettingsRepository, AppError, AppResult};
use tracing::{error, instrument};

/// PostgreSQL implementation of SettingsRepository
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    /// Create a new settings repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    #[instrument(skip(self))]
    async fn load_all(&self) -> AppResult<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM billing_settings")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error loading billing settings: {}", e);
                AppError::Database(format!("Failed to load billing settings: {}", e))
            })?;

        Ok(rows.into_iter().collect())
    }

    #[instrument(skip(self))]
    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error saving billing setting {}: {}", key, e);
            AppError::Database(format!("Failed to save billing setting: {}", e))
        })?;

        Ok(())
    }
}

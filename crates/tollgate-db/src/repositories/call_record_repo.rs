//! Call record repository implementation
//!
//! Status transitions are conditional updates so a record that already
//! ended is never rewritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tollgate_core::{
    models::{BillingStatus, CallRecord, CallStatus},
    traits::CallRecordRepository,
    AppError, AppResult,
};
use tracing::{debug, error, instrument};

const CALL_COLUMNS: &str = "call_id, user_id, destination, start_time, end_time, \
     status, billing_status, cost, actual_duration, billable_duration, termination_reason, \
     created_at, updated_at";

/// PostgreSQL implementation of CallRecordRepository
pub struct PgCallRecordRepository {
    pool: PgPool,
}

impl PgCallRecordRepository {
    /// Create a new call record repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRecordRepository for PgCallRecordRepository {
    #[instrument(skip(self))]
    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallRecord>> {
        let query = format!("SELECT {} FROM call_records WHERE call_id = $1", CALL_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&query)
            .bind(call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call {}: {}", call_id, e);
                AppError::Database(format!("Failed to find call record: {}", e))
            })?;

        row.map(CallRecordRow::into_record).transpose()
    }

    #[instrument(skip(self, record), fields(call_id = %record.call_id))]
    async fn create(&self, record: &CallRecord) -> AppResult<CallRecord> {
        debug!("Creating call record");

        let query = format!(
            r#"
            INSERT INTO call_records (
                call_id, user_id, destination, start_time, end_time,
                status, billing_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (call_id) DO NOTHING
            RETURNING {}
            "#,
            CALL_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&query)
            .bind(&record.call_id)
            .bind(record.user_id)
            .bind(&record.destination)
            .bind(record.start_time)
            .bind(record.end_time)
            .bind(record.status.to_string())
            .bind(record.billing_status.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating call {}: {}", record.call_id, e);
                AppError::Database(format!("Failed to create call record: {}", e))
            })?;

        match row {
            Some(row) => row.into_record(),
            None => Err(AppError::Conflict(format!(
                "call {} already exists",
                record.call_id
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn list_in_progress(&self) -> AppResult<Vec<CallRecord>> {
        let query = format!(
            "SELECT {} FROM call_records WHERE status = 'in_progress' ORDER BY start_time",
            CALL_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing active calls: {}", e);
                AppError::Database(format!("Failed to list active calls: {}", e))
            })?;

        rows.into_iter().map(CallRecordRow::into_record).collect()
    }

    #[instrument(skip(self))]
    async fn mark_in_progress(&self, call_id: &str) -> AppResult<Option<CallRecord>> {
        sqlx::query(
            r#"
            UPDATE call_records
            SET status = 'in_progress', updated_at = NOW()
            WHERE call_id = $1 AND status = 'initiated'
            "#,
        )
        .bind(call_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error starting call {}: {}", call_id, e);
            AppError::Database(format!("Failed to update call status: {}", e))
        })?;

        self.find_by_call_id(call_id).await
    }

    #[instrument(skip(self))]
    async fn mark_ended(
        &self,
        call_id: &str,
        status: CallStatus,
        end_time: DateTime<Utc>,
    ) -> AppResult<Option<CallRecord>> {
        sqlx::query(
            r#"
            UPDATE call_records
            SET status = $2,
                end_time = COALESCE(end_time, GREATEST($3, start_time)),
                updated_at = NOW()
            WHERE call_id = $1 AND status IN ('initiated', 'in_progress')
            "#,
        )
        .bind(call_id)
        .bind(status.to_string())
        .bind(end_time)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error ending call {}: {}", call_id, e);
            AppError::Database(format!("Failed to update call status: {}", e))
        })?;

        self.find_by_call_id(call_id).await
    }

    #[instrument(skip(self))]
    async fn mark_terminated(
        &self,
        call_id: &str,
        end_time: DateTime<Utc>,
        reason: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_records
            SET status = 'terminated',
                billing_status = 'terminated',
                end_time = COALESCE(end_time, GREATEST($2, start_time)),
                termination_reason = $3,
                updated_at = NOW()
            WHERE call_id = $1 AND status IN ('initiated', 'in_progress')
            "#,
        )
        .bind(call_id)
        .bind(end_time)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error terminating call {}: {}", call_id, e);
            AppError::Database(format!("Failed to mark call terminated: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn mark_billing_error(&self, call_id: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE call_records
            SET billing_status = 'error', updated_at = NOW()
            WHERE call_id = $1 AND cost IS NULL
            "#,
        )
        .bind(call_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error flagging call {}: {}", call_id, e);
            AppError::Database(format!("Failed to flag billing error: {}", e))
        })?;

        Ok(())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRecordRow {
    call_id: String,
    user_id: i64,
    destination: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    billing_status: String,
    cost: Option<Decimal>,
    actual_duration: Option<i64>,
    billable_duration: Option<i64>,
    termination_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CallRecordRow {
    fn into_record(self) -> AppResult<CallRecord> {
        let status = CallStatus::parse(&self.status).ok_or_else(|| {
            AppError::Database(format!("Unknown call status: {}", self.status))
        })?;
        let billing_status = BillingStatus::parse(&self.billing_status).ok_or_else(|| {
            AppError::Database(format!("Unknown billing status: {}", self.billing_status))
        })?;

        Ok(CallRecord {
            call_id: self.call_id,
            user_id: self.user_id,
            destination: self.destination,
            start_time: self.start_time,
            end_time: self.end_time,
            status,
            billing_status,
            cost: self.cost,
            actual_duration: self.actual_duration,
            billable_duration: self.billable_duration,
            termination_reason: self.termination_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, billing_status: &str) -> CallRecordRow {
        let now = Utc::now();
        CallRecordRow {
            call_id: "c-1".to_string(),
            user_id: 1,
            destination: "18005551234".to_string(),
            start_time: now,
            end_time: None,
            status: status.to_string(),
            billing_status: billing_status.to_string(),
            cost: None,
            actual_duration: None,
            billable_duration: None,
            termination_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_mapping() {
        let record = row("in_progress", "pending").into_record().unwrap();
        assert_eq!(record.status, CallStatus::InProgress);
        assert_eq!(record.billing_status, BillingStatus::Pending);
    }

    #[test]
    fn test_row_with_unknown_status() {
        let err = row("ringing", "pending").into_record().unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}

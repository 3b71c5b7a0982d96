//! Balance ledger implementation
//!
//! Every balance change locks the account row (`FOR UPDATE`), appends a
//! ledger entry and writes the new balance in the same transaction.
//! Settlement additionally locks the call record so a call is debited at
//! most once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tollgate_core::{
    models::{
        AccountType, BillingStatus, CallSettlement, EntryType, LedgerEntry, LedgerRequest,
        SettleOutcome,
    },
    traits::LedgerStore,
    AppError, AppResult,
};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of LedgerStore
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new ledger store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Apply `request` inside an open transaction
///
/// Locks the account row, inserts the entry and updates the balance.
pub(crate) async fn apply_locked(
    conn: &mut PgConnection,
    request: &LedgerRequest,
) -> AppResult<LedgerEntry> {
    let (balance, _) = lock_account(conn, request.user_id).await?;
    let entry = LedgerEntry::from_request(request, balance);
    write_entry(conn, &entry).await?;
    Ok(entry)
}

async fn lock_account(conn: &mut PgConnection, user_id: i64) -> AppResult<(Decimal, AccountType)> {
    let row: Option<(Decimal, String)> =
        sqlx::query_as("SELECT balance, account_type FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                error!("Failed to lock account {}: {}", user_id, e);
                AppError::Transaction(format!("Failed to lock account: {}", e))
            })?;

    let (balance, account_type) =
        row.ok_or_else(|| AppError::AccountNotFound(user_id.to_string()))?;
    Ok((balance, AccountType::parse(&account_type).unwrap_or_default()))
}

async fn write_entry(conn: &mut PgConnection, entry: &LedgerEntry) -> AppResult<()> {
    sqlx::query("UPDATE accounts SET balance = $1, updated_at = NOW() WHERE id = $2")
        .bind(entry.balance_after)
        .bind(entry.user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            error!("Failed to update balance for {}: {}", entry.user_id, e);
            AppError::Transaction(format!("Failed to update balance: {}", e))
        })?;

    sqlx::query(
        r#"
        INSERT INTO ledger_entries
            (id, user_id, entry_type, amount, balance_before, balance_after,
             description, call_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.id)
    .bind(entry.user_id)
    .bind(entry.entry_type.to_string())
    .bind(entry.amount)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(&entry.description)
    .bind(&entry.call_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        error!("Failed to insert ledger entry for {}: {}", entry.user_id, e);
        AppError::Transaction(format!("Failed to insert ledger entry: {}", e))
    })?;

    Ok(())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self, request), fields(user_id = request.user_id, entry_type = %request.entry_type))]
    async fn apply_entry(&self, request: &LedgerRequest) -> AppResult<LedgerEntry> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let entry = apply_locked(&mut *tx, request).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            "Ledger {} of {} applied: {} -> {}",
            entry.entry_type, entry.amount, entry.balance_before, entry.balance_after
        );
        Ok(entry)
    }

    #[instrument(skip(self, settlement), fields(call_id = %settlement.call_id, cost = %settlement.cost))]
    async fn settle_call(&self, settlement: &CallSettlement) -> AppResult<SettleOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock the call first so concurrent settlements of one call serialize here
        let call: Option<(i64, Option<Decimal>, String)> = sqlx::query_as(
            "SELECT user_id, cost, billing_status FROM call_records WHERE call_id = $1 FOR UPDATE",
        )
        .bind(&settlement.call_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to lock call {}: {}", settlement.call_id, e);
            AppError::Transaction(format!("Failed to lock call record: {}", e))
        })?;

        let (user_id, cost, billing_status) =
            call.ok_or_else(|| AppError::CallNotFound(settlement.call_id.clone()))?;

        if cost.is_some() {
            tx.rollback().await.ok();
            debug!("Call already settled");
            return Ok(SettleOutcome::AlreadySettled);
        }

        let current = BillingStatus::parse(&billing_status).unwrap_or_default();
        let (balance, account_type) = lock_account(&mut *tx, user_id).await?;

        let request = LedgerRequest {
            user_id,
            entry_type: EntryType::Debit,
            amount: settlement.cost,
            description: settlement.description.clone(),
            call_id: Some(settlement.call_id.clone()),
        };
        let entry = LedgerEntry::from_request(&request, balance);
        let billing_status =
            BillingStatus::for_settlement(current, account_type, balance, settlement.cost);

        write_entry(&mut *tx, &entry).await?;

        sqlx::query(
            r#"
            UPDATE call_records
            SET cost = $2,
                actual_duration = $3,
                billable_duration = $4,
                billing_status = $5,
                end_time = COALESCE(end_time, GREATEST($6, start_time)),
                status = CASE
                    WHEN status IN ('initiated', 'in_progress') THEN 'completed'
                    ELSE status
                END,
                updated_at = NOW()
            WHERE call_id = $1
            "#,
        )
        .bind(&settlement.call_id)
        .bind(settlement.cost)
        .bind(settlement.actual_duration)
        .bind(settlement.billable_duration)
        .bind(billing_status.to_string())
        .bind(settlement.end_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to write cost for {}: {}", settlement.call_id, e);
            AppError::Transaction(format!("Failed to update call record: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit settlement: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            user_id,
            billing_status = %billing_status,
            "Call settled: balance {} -> {}",
            entry.balance_before,
            entry.balance_after
        );

        Ok(SettleOutcome::Settled {
            entry,
            billing_status,
        })
    }

    #[instrument(skip(self))]
    async fn history(&self, user_id: i64, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<sqlx::Postgres, LedgerEntryRow>(
            r#"
            SELECT id, user_id, entry_type, amount, balance_before, balance_after,
                   description, call_id, created_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error loading ledger for {}: {}", user_id, e);
            AppError::Database(format!("Failed to load ledger history: {}", e))
        })?;

        rows.into_iter().map(LedgerEntryRow::into_entry).collect()
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct LedgerEntryRow {
    id: Uuid,
    user_id: i64,
    entry_type: String,
    amount: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    description: String,
    call_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl LedgerEntryRow {
    fn into_entry(self) -> AppResult<LedgerEntry> {
        let entry_type = EntryType::parse(&self.entry_type).ok_or_else(|| {
            AppError::Database(format!("Unknown ledger entry type: {}", self.entry_type))
        })?;

        Ok(LedgerEntry {
            id: self.id,
            user_id: self.user_id,
            entry_type,
            amount: self.amount,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            description: self.description,
            call_id: self.call_id,
            created_at: self.created_at,
        })
    }
}

//! Account repository implementation
//!
//! Accounts start at a zero balance; an opening balance is written as a
//! ledger entry so the balance always equals the sum of its entries.

use crate::repositories::ledger_repo::apply_locked;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tollgate_core::{
    models::{Account, AccountType, EntryType, LedgerRequest},
    traits::AccountRepository,
    AppError, AppResult,
};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of AccountRepository
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    /// Create a new account repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Account>> {
        debug!("Finding account by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, AccountRow>(
            r#"
            SELECT id, name, account_type, balance, credit_limit, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding account {}: {}", id, e);
            AppError::Database(format!("Failed to find account: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, account))]
    async fn create(&self, account: &Account) -> AppResult<Account> {
        debug!("Creating {} account", account.account_type);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let row = sqlx::query_as::<sqlx::Postgres, AccountRow>(
            r#"
            INSERT INTO accounts (name, account_type, balance, credit_limit)
            VALUES ($1, $2, 0, $3)
            RETURNING id, name, account_type, balance, credit_limit, created_at, updated_at
            "#,
        )
        .bind(&account.name)
        .bind(account.account_type.to_string())
        .bind(account.credit_limit)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error creating account: {}", e);
            AppError::Database(format!("Failed to create account: {}", e))
        })?;

        let mut created: Account = row.into();

        if !account.balance.is_zero() {
            let entry_type = if account.balance.is_sign_negative() {
                EntryType::Debit
            } else {
                EntryType::Credit
            };
            let request = LedgerRequest {
                user_id: created.id,
                entry_type,
                amount: account.balance.abs(),
                description: "Opening balance".to_string(),
                call_id: None,
            };
            let entry = apply_locked(&mut *tx, &request).await?;
            created.balance = entry.balance_after;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(created)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    name: Option<String>,
    account_type: String,
    balance: Decimal,
    credit_limit: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            account_type: AccountType::parse(&row.account_type).unwrap_or_default(),
            balance: row.balance,
            credit_limit: row.credit_limit,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

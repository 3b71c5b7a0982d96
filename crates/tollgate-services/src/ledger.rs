//! Balance ledger
//!
//! Manual credits and debits. Atomicity lives in the `LedgerStore`; this
//! layer validates requests and never checks affordability, which is the
//! billing engine's job.

use rust_decimal::Decimal;
use std::sync::Arc;
use tollgate_core::{
    models::{EntryType, LedgerEntry, LedgerRequest},
    traits::{AccountRepository, LedgerStore},
    AppError, AppResult,
};
use tracing::{info, instrument};

pub struct BalanceLedger {
    accounts: Arc<dyn AccountRepository>,
    store: Arc<dyn LedgerStore>,
}

impl BalanceLedger {
    pub fn new(accounts: Arc<dyn AccountRepository>, store: Arc<dyn LedgerStore>) -> Self {
        Self { accounts, store }
    }

    /// Add funds; returns the new balance
    #[instrument(skip(self))]
    pub async fn credit(&self, user_id: i64, amount: Decimal, description: &str) -> AppResult<Decimal> {
        self.apply(user_id, EntryType::Credit, amount, description).await
    }

    /// Remove funds; returns the new balance, which may be negative
    #[instrument(skip(self))]
    pub async fn debit(&self, user_id: i64, amount: Decimal, description: &str) -> AppResult<Decimal> {
        self.apply(user_id, EntryType::Debit, amount, description).await
    }

    pub async fn balance(&self, user_id: i64) -> AppResult<Decimal> {
        self.accounts
            .find_by_id(user_id)
            .await?
            .map(|a| a.balance)
            .ok_or_else(|| AppError::AccountNotFound(user_id.to_string()))
    }

    /// Most recent entries first
    pub async fn history(&self, user_id: i64, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        self.store.history(user_id, limit.clamp(1, 1000)).await
    }

    async fn apply(
        &self,
        user_id: i64,
        entry_type: EntryType,
        amount: Decimal,
        description: &str,
    ) -> AppResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(format!(
                "{} amount must be positive, got {}",
                entry_type, amount
            )));
        }

        let entry = self
            .store
            .apply_entry(&LedgerRequest {
                user_id,
                entry_type,
                amount,
                description: description.to_string(),
                call_id: None,
            })
            .await?;

        info!(
            user_id,
            "{} {}: {} -> {}",
            entry_type, amount, entry.balance_before, entry.balance_after
        );
        Ok(entry.balance_after)
    }
}

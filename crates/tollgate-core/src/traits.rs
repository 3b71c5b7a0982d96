//! Common traits for repositories and collaborators
//!
//! Defines abstractions for durable storage, the session store and call
//! control so the billing services never depend on a concrete backend.

use crate::error::AppError;
use crate::models::{
    Account, BillingSession, CallRecord, CallSettlement, CallStatus, LedgerEntry, LedgerRequest,
    Rate, RateTier, SettleOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Rate repository
#[async_trait]
pub trait RateRepository: Send + Sync {
    /// Longest-prefix match within one tier
    ///
    /// Only rates effective at `now` participate. Among equal prefixes the
    /// latest `effective_date` wins.
    async fn find_by_destination(
        &self,
        tier: RateTier,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Rate>, AppError>;

    /// Insert a rate into the table for `rate.tier`
    async fn create(&self, rate: &Rate) -> Result<Rate, AppError>;
}

/// Call record repository
#[async_trait]
pub trait CallRecordRepository: Send + Sync {
    async fn find_by_call_id(&self, call_id: &str) -> Result<Option<CallRecord>, AppError>;

    /// Insert a new record; fails with `Conflict` if the call id exists
    async fn create(&self, record: &CallRecord) -> Result<CallRecord, AppError>;

    /// Calls currently `in_progress`
    async fn list_in_progress(&self) -> Result<Vec<CallRecord>, AppError>;

    /// `initiated → in_progress`; returns the updated record
    async fn mark_in_progress(&self, call_id: &str) -> Result<Option<CallRecord>, AppError>;

    /// Record the end of a call if it has not ended yet
    ///
    /// Returns the record as stored after the call, whether or not this call
    /// changed it.
    async fn mark_ended(
        &self,
        call_id: &str,
        status: CallStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<CallRecord>, AppError>;

    /// Cut a live call: status and billing status become `terminated`
    ///
    /// Returns false if the call was no longer active.
    async fn mark_terminated(
        &self,
        call_id: &str,
        end_time: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, AppError>;

    /// Flag a call that could not be priced
    async fn mark_billing_error(&self, call_id: &str) -> Result<(), AppError>;
}

/// Account repository
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AppError>;

    async fn create(&self, account: &Account) -> Result<Account, AppError>;
}

/// Atomic balance changes
///
/// Every method runs in one transaction: the balance row is locked, the
/// ledger entry appended and the balance updated together.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Credit or debit an account outside of call settlement
    async fn apply_entry(&self, request: &LedgerRequest) -> Result<LedgerEntry, AppError>;

    /// Debit a call's cost and write its final cost fields in one transaction
    ///
    /// A call whose cost is already set returns `AlreadySettled` without
    /// writing anything.
    async fn settle_call(&self, settlement: &CallSettlement) -> Result<SettleOutcome, AppError>;

    /// Most recent entries first
    async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<LedgerEntry>, AppError>;
}

/// Operator settings key/value store
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load_all(&self) -> Result<HashMap<String, String>, AppError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
}

/// Held while a caller owns the per-call lock; released on drop
pub trait SessionGuard: Send {}

/// Billing session store
///
/// Read-modify-write on one call's session must happen under
/// [`SessionStore::lock`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, call_id: &str) -> Result<Option<BillingSession>, AppError>;

    /// Store the session, replacing any previous value, with a TTL
    async fn put(&self, session: &BillingSession, ttl_secs: u64) -> Result<(), AppError>;

    /// Returns true if a session was removed
    async fn delete(&self, call_id: &str) -> Result<bool, AppError>;

    /// Acquire the per-call lock, waiting up to the store's lock timeout
    async fn lock(&self, call_id: &str) -> Result<Box<dyn SessionGuard>, AppError>;

    /// Call ids with a live session
    async fn active_call_ids(&self) -> Result<Vec<String>, AppError>;

    /// Drop expired sessions and idle bookkeeping, returning how many
    /// sessions went away. Stores whose entries expire on their own
    /// have nothing to do.
    async fn purge_expired(&self) -> Result<usize, AppError> {
        Ok(0)
    }
}

/// Outcome of a hangup request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HangupResult {
    pub success: bool,
    pub message: String,
}

impl HangupResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// External call-control system
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Ask the switch to hang up `call_id`
    ///
    /// Unreachable switches are reported as `Err` or `success = false`;
    /// callers treat both as a failed attempt.
    async fn hangup(&self, call_id: &str) -> Result<HangupResult, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hangup_result_constructors() {
        let ok = HangupResult::ok("+OK");
        assert!(ok.success);
        assert_eq!(ok.message, "+OK");

        let failed = HangupResult::failed("-ERR no such channel");
        assert!(!failed.success);
    }
}

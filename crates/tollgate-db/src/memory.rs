//! In-memory durable store
//!
//! Implements every repository trait over plain maps behind one mutex, so
//! each operation is atomic exactly like a database transaction. Suitable
//! for single-process deployments and tests; nothing survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tollgate_core::{
    models::{
        Account, BillingStatus, CallRecord, CallSettlement, CallStatus, EntryType, LedgerEntry,
        LedgerRequest, Rate, RateTier, SettleOutcome,
    },
    traits::{
        AccountRepository, CallRecordRepository, LedgerStore, RateRepository, SettingsRepository,
    },
    AppError, AppResult,
};
use tracing::debug;

#[derive(Default)]
struct State {
    rates: Vec<Rate>,
    next_rate_id: i64,
    calls: HashMap<String, CallRecord>,
    accounts: HashMap<i64, Account>,
    next_account_id: i64,
    ledger: Vec<LedgerEntry>,
    settings: HashMap<String, String>,
}

impl State {
    fn apply(&mut self, request: &LedgerRequest) -> AppResult<LedgerEntry> {
        let account = self
            .accounts
            .get_mut(&request.user_id)
            .ok_or_else(|| AppError::AccountNotFound(request.user_id.to_string()))?;

        let entry = LedgerEntry::from_request(request, account.balance);
        account.balance = entry.balance_after;
        account.updated_at = entry.created_at;
        self.ledger.push(entry.clone());
        Ok(entry)
    }
}

/// In-memory implementation of all durable store traits
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all ledger entries for `user_id`
    pub fn ledger_sum(&self, user_id: i64) -> rust_decimal::Decimal {
        self.state
            .lock()
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(LedgerEntry::signed_amount)
            .sum()
    }

    /// Number of debits recorded against `call_id`
    pub fn debits_for_call(&self, call_id: &str) -> usize {
        self.state
            .lock()
            .ledger
            .iter()
            .filter(|e| e.entry_type == EntryType::Debit && e.call_id.as_deref() == Some(call_id))
            .count()
    }
}

#[async_trait]
impl RateRepository for InMemoryStore {
    async fn find_by_destination(
        &self,
        tier: RateTier,
        destination: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Rate>> {
        let prefixes = Rate::generate_prefixes(destination);
        let state = self.state.lock();

        // Prefixes come longest first, so the first tier hit is the LPM
        for prefix in &prefixes {
            let best = state
                .rates
                .iter()
                .filter(|r| r.tier == tier && &r.destination_prefix == prefix)
                .filter(|r| r.is_effective_at(now))
                .max_by_key(|r| r.effective_date);

            if let Some(rate) = best {
                return Ok(Some(rate.clone()));
            }
        }

        Ok(None)
    }

    async fn create(&self, rate: &Rate) -> AppResult<Rate> {
        let prefix = Rate::normalize_destination(&rate.destination_prefix);
        if prefix.is_empty() {
            return Err(AppError::Validation(
                "destination_prefix must contain digits".to_string(),
            ));
        }

        let mut state = self.state.lock();
        state.next_rate_id += 1;
        let now = Utc::now();
        let created = Rate {
            id: state.next_rate_id,
            destination_prefix: prefix,
            created_at: now,
            updated_at: now,
            ..rate.clone()
        };
        state.rates.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl CallRecordRepository for InMemoryStore {
    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallRecord>> {
        Ok(self.state.lock().calls.get(call_id).cloned())
    }

    async fn create(&self, record: &CallRecord) -> AppResult<CallRecord> {
        let mut state = self.state.lock();
        if state.calls.contains_key(&record.call_id) {
            return Err(AppError::Conflict(format!(
                "call {} already exists",
                record.call_id
            )));
        }
        if !state.accounts.contains_key(&record.user_id) {
            return Err(AppError::AccountNotFound(record.user_id.to_string()));
        }

        let now = Utc::now();
        let created = CallRecord {
            cost: None,
            actual_duration: None,
            billable_duration: None,
            termination_reason: None,
            created_at: now,
            updated_at: now,
            ..record.clone()
        };
        state.calls.insert(created.call_id.clone(), created.clone());
        Ok(created)
    }

    async fn list_in_progress(&self) -> AppResult<Vec<CallRecord>> {
        let state = self.state.lock();
        let mut calls: Vec<CallRecord> = state
            .calls
            .values()
            .filter(|c| c.status == CallStatus::InProgress)
            .cloned()
            .collect();
        calls.sort_by_key(|c| c.start_time);
        Ok(calls)
    }

    async fn mark_in_progress(&self, call_id: &str) -> AppResult<Option<CallRecord>> {
        let mut state = self.state.lock();
        Ok(state.calls.get_mut(call_id).map(|call| {
            if call.status == CallStatus::Initiated {
                call.status = CallStatus::InProgress;
                call.updated_at = Utc::now();
            }
            call.clone()
        }))
    }

    async fn mark_ended(
        &self,
        call_id: &str,
        status: CallStatus,
        end_time: DateTime<Utc>,
    ) -> AppResult<Option<CallRecord>> {
        let mut state = self.state.lock();
        Ok(state.calls.get_mut(call_id).map(|call| {
            if call.status.is_active() {
                call.status = status;
                call.end_time.get_or_insert(end_time.max(call.start_time));
                call.updated_at = Utc::now();
            }
            call.clone()
        }))
    }

    async fn mark_terminated(
        &self,
        call_id: &str,
        end_time: DateTime<Utc>,
        reason: &str,
    ) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.calls.get_mut(call_id) {
            Some(call) if call.status.is_active() => {
                call.status = CallStatus::Terminated;
                call.billing_status = BillingStatus::Terminated;
                call.end_time.get_or_insert(end_time.max(call.start_time));
                call.termination_reason = Some(reason.to_string());
                call.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_billing_error(&self, call_id: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(call) = state.calls.get_mut(call_id) {
            if call.cost.is_none() {
                call.billing_status = BillingStatus::Error;
                call.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Account>> {
        Ok(self.state.lock().accounts.get(&id).cloned())
    }

    async fn create(&self, account: &Account) -> AppResult<Account> {
        let mut state = self.state.lock();
        state.next_account_id += 1;
        let id = state.next_account_id;
        let now = Utc::now();

        state.accounts.insert(
            id,
            Account {
                id,
                balance: rust_decimal::Decimal::ZERO,
                created_at: now,
                updated_at: now,
                ..account.clone()
            },
        );

        if !account.balance.is_zero() {
            let entry_type = if account.balance.is_sign_negative() {
                EntryType::Debit
            } else {
                EntryType::Credit
            };
            state.apply(&LedgerRequest {
                user_id: id,
                entry_type,
                amount: account.balance.abs(),
                description: "Opening balance".to_string(),
                call_id: None,
            })?;
        }

        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("account {} vanished", id)))
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn apply_entry(&self, request: &LedgerRequest) -> AppResult<LedgerEntry> {
        self.state.lock().apply(request)
    }

    async fn settle_call(&self, settlement: &CallSettlement) -> AppResult<SettleOutcome> {
        let mut state = self.state.lock();

        let call = state
            .calls
            .get(&settlement.call_id)
            .ok_or_else(|| AppError::CallNotFound(settlement.call_id.clone()))?;
        if call.is_settled() {
            debug!(call_id = %settlement.call_id, "Call already settled");
            return Ok(SettleOutcome::AlreadySettled);
        }
        let user_id = call.user_id;
        let current = call.billing_status;

        let account = state
            .accounts
            .get(&user_id)
            .ok_or_else(|| AppError::AccountNotFound(user_id.to_string()))?;
        let billing_status = BillingStatus::for_settlement(
            current,
            account.account_type,
            account.balance,
            settlement.cost,
        );

        let entry = state.apply(&LedgerRequest {
            user_id,
            entry_type: EntryType::Debit,
            amount: settlement.cost,
            description: settlement.description.clone(),
            call_id: Some(settlement.call_id.clone()),
        })?;

        if let Some(call) = state.calls.get_mut(&settlement.call_id) {
            call.cost = Some(settlement.cost);
            call.actual_duration = Some(settlement.actual_duration);
            call.billable_duration = Some(settlement.billable_duration);
            call.billing_status = billing_status;
            call.end_time
                .get_or_insert(settlement.end_time.max(call.start_time));
            if call.status.is_active() {
                call.status = CallStatus::Completed;
            }
            call.updated_at = Utc::now();
        }

        Ok(SettleOutcome::Settled {
            entry,
            billing_status,
        })
    }

    async fn history(&self, user_id: i64, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        let state = self.state.lock();
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryStore {
    async fn load_all(&self) -> AppResult<HashMap<String, String>> {
        Ok(self.state.lock().settings.clone())
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.state
            .lock()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

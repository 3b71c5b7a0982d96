//! Real-time billing engine
//!
//! Drives a call's billing session through its life:
//!
//! - `start_real_time_billing` resolves the rate and opens a session charged
//!   for the first increment window
//! - `process_periodic_billing` re-prices the session from elapsed time and
//!   checks the customer can still pay, terminating the call when not
//! - `finalize_billing` settles the call when it ends
//!
//! Each call's session is only touched under its per-call lock, so ticks for
//! the same call never interleave while different calls run in parallel.

use crate::rate_resolver::RateResolver;
use crate::settings::SettingsProvider;
use crate::settlement::SettlementService;
use crate::termination::{TerminationCoordinator, INSUFFICIENT_BALANCE};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tollgate_core::{
    billing,
    models::{BillingSession, CallRecord, CallStatus},
    traits::{AccountRepository, CallRecordRepository, SessionStore},
    AppError, AppResult,
};
use tracing::{debug, error, info, instrument, warn};

/// Result of one periodic evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No billing session: the call is billed at the end only
    Untracked,
    /// Re-priced; the customer can pay or termination is not due yet
    Billed,
    /// Re-priced and cut for insufficient balance
    Terminated,
    /// Termination was due but the hangup did not go through
    TerminationFailed,
}

/// Summary of one pass over all in-progress calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub untracked: usize,
    pub terminated: usize,
    pub termination_failed: usize,
    pub failed: usize,
    /// Sessions dropped by the store sweep before the batch ran
    pub expired_sessions: usize,
    pub duration_ms: u64,
}

impl BatchReport {
    fn record(&mut self, outcome: &AppResult<TickOutcome>) {
        self.processed += 1;
        match outcome {
            Ok(TickOutcome::Untracked) => self.untracked += 1,
            Ok(TickOutcome::Billed) => {}
            Ok(TickOutcome::Terminated) => self.terminated += 1,
            Ok(TickOutcome::TerminationFailed) => self.termination_failed += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Process-lifetime counters
#[derive(Debug, Default)]
struct EngineCounters {
    sessions_started: AtomicU64,
    periodic_checks: AtomicU64,
    terminations: AtomicU64,
    termination_failures: AtomicU64,
    finalizations: AtomicU64,
}

impl EngineCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            periodic_checks: self.periodic_checks.load(Ordering::Relaxed),
            terminations: self.terminations.load(Ordering::Relaxed),
            termination_failures: self.termination_failures.load(Ordering::Relaxed),
            finalizations: self.finalizations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub sessions_started: u64,
    pub periodic_checks: u64,
    pub terminations: u64,
    pub termination_failures: u64,
    pub finalizations: u64,
}

/// Real-time billing statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingStatistics {
    pub enabled: bool,
    pub active_sessions: usize,
    pub total_current_cost: Decimal,
    pub total_reserved: Decimal,
    pub total_billable_seconds: i64,
    pub counters: CounterSnapshot,
}

pub struct RealtimeBillingEngine {
    rates: Arc<RateResolver>,
    settings: Arc<dyn SettingsProvider>,
    sessions: Arc<dyn SessionStore>,
    calls: Arc<dyn CallRecordRepository>,
    accounts: Arc<dyn AccountRepository>,
    settlement: Arc<SettlementService>,
    terminator: Arc<TerminationCoordinator>,
    session_ttl_secs: u64,
    concurrency: usize,
    counters: EngineCounters,
}

impl RealtimeBillingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rates: Arc<RateResolver>,
        settings: Arc<dyn SettingsProvider>,
        sessions: Arc<dyn SessionStore>,
        calls: Arc<dyn CallRecordRepository>,
        accounts: Arc<dyn AccountRepository>,
        settlement: Arc<SettlementService>,
        terminator: Arc<TerminationCoordinator>,
        session_ttl_secs: u64,
    ) -> Self {
        Self {
            rates,
            settings,
            sessions,
            calls,
            accounts,
            settlement,
            terminator,
            session_ttl_secs,
            concurrency: 32,
            counters: EngineCounters::default(),
        }
    }

    /// Upper bound on calls evaluated at once by `process_batch`
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Open a billing session for a call
    ///
    /// Returns false when real-time billing is disabled, the call is not
    /// live, or no rate applies. Starting an already started call is a no-op
    /// that returns true.
    #[instrument(skip(self, record), fields(call_id = %record.call_id))]
    pub async fn start_real_time_billing(&self, record: &CallRecord) -> AppResult<bool> {
        let settings = self.settings.current().await;
        if !settings.real_time_billing_enabled {
            debug!("Real-time billing disabled, call will be billed at the end");
            return Ok(false);
        }
        if !record.status.is_active() {
            warn!(status = %record.status, "Cannot start billing for a call that has ended");
            return Ok(false);
        }

        let account = self
            .accounts
            .find_by_id(record.user_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(record.user_id.to_string()))?;

        let resolved = match self.rates.resolve(&record.destination).await {
            Ok(resolved) => resolved,
            Err(AppError::RateNotFound(destination)) => {
                warn!("No rate for {}, real-time billing unavailable", destination);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let _guard = self.sessions.lock(&record.call_id).await?;
        if self.sessions.get(&record.call_id).await?.is_some() {
            debug!("Billing session already exists");
            return Ok(true);
        }

        let config = resolved.billing_config;
        let minimum_duration = resolved.rate.minimum_duration;
        let billable = billing::billable_seconds(config.initial, config, minimum_duration);
        let cost = billing::cost(
            billable,
            resolved.rate.rate_per_minute,
            settings.billing_precision,
            settings.rounding_method,
        );

        let now = Utc::now();
        let session = BillingSession {
            call_id: record.call_id.clone(),
            user_id: record.user_id,
            destination: record.destination.clone(),
            account_type: account.account_type,
            billing_config: config,
            rate_per_minute: resolved.rate.rate_per_minute,
            minimum_duration,
            matched_prefix: resolved.rate.destination_prefix.clone(),
            current_cost: cost,
            billable_duration: billable,
            periodic_check_count: 0,
            reserved_amount: cost,
            low_balance_since: None,
            last_termination_attempt: None,
            start_time: record.start_time,
            updated_at: now,
        };
        self.sessions.put(&session, self.session_ttl_secs).await?;

        if record.status == CallStatus::Initiated {
            self.calls.mark_in_progress(&record.call_id).await?;
        }

        EngineCounters::bump(&self.counters.sessions_started);
        info!(
            user_id = record.user_id,
            prefix = %session.matched_prefix,
            increment = %config,
            "Real-time billing started at {}/min",
            session.rate_per_minute
        );
        Ok(true)
    }

    /// Re-price a live call and enforce its balance
    ///
    /// Returns false when the call has no billing session.
    pub async fn process_periodic_billing(&self, record: &CallRecord) -> AppResult<bool> {
        Ok(self.evaluate(record).await? != TickOutcome::Untracked)
    }

    #[instrument(skip(self, record), fields(call_id = %record.call_id))]
    async fn evaluate(&self, record: &CallRecord) -> AppResult<TickOutcome> {
        let settings = self.settings.current().await;

        let guard = self.sessions.lock(&record.call_id).await?;
        let Some(mut session) = self.sessions.get(&record.call_id).await? else {
            return Ok(TickOutcome::Untracked);
        };
        if !session.matches(record) {
            warn!(
                session_user = session.user_id,
                record_user = record.user_id,
                "Billing session does not belong to this call"
            );
            return Ok(TickOutcome::Untracked);
        }

        let now = Utc::now();
        let elapsed = session.elapsed_seconds(now);
        let billable = billing::billable_seconds(elapsed, session.billing_config, session.minimum_duration);
        let cost = billing::cost(
            billable,
            session.rate_per_minute,
            settings.billing_precision,
            settings.rounding_method,
        );
        session.advance(billable, cost, now);

        let account = self
            .accounts
            .find_by_id(session.user_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(session.user_id.to_string()))?;
        let available = account.available_balance();

        if available >= session.current_cost {
            if session.low_balance_since.take().is_some() {
                info!("Balance recovered, termination cancelled");
            }
        } else if session.low_balance_since.is_none() {
            warn!(
                user_id = session.user_id,
                "Insufficient balance: accrued {}, available {}",
                session.current_cost,
                available
            );
            session.low_balance_since = Some(now);
        }

        let terminate = settings.auto_terminate_on_zero_balance
            && session
                .low_balance_for(now)
                .is_some_and(|short_for| short_for >= settings.grace_period_seconds);

        self.sessions.put(&session, self.session_ttl_secs).await?;
        drop(guard);
        EngineCounters::bump(&self.counters.periodic_checks);

        debug!(
            elapsed,
            billable = session.billable_duration,
            cost = %session.current_cost,
            check = session.periodic_check_count,
            "Billing session updated"
        );

        if !terminate {
            return Ok(TickOutcome::Billed);
        }

        match self
            .terminator
            .terminate_for_insufficient_balance(record, INSUFFICIENT_BALANCE)
            .await
        {
            Ok(true) => {
                EngineCounters::bump(&self.counters.terminations);
                EngineCounters::bump(&self.counters.finalizations);
                Ok(TickOutcome::Terminated)
            }
            Ok(false) => {
                EngineCounters::bump(&self.counters.termination_failures);
                Ok(TickOutcome::TerminationFailed)
            }
            Err(e) => {
                error!("Termination failed: {}", e);
                EngineCounters::bump(&self.counters.termination_failures);
                Ok(TickOutcome::TerminationFailed)
            }
        }
    }

    /// Settle an ended call; see [`SettlementService::finalize_billing`]
    pub async fn finalize_billing(&self, record: &CallRecord) -> AppResult<bool> {
        let settled = self.settlement.finalize_billing(record).await?;
        if settled {
            EngineCounters::bump(&self.counters.finalizations);
        }
        Ok(settled)
    }

    /// Cut a live call now through the normal termination path
    ///
    /// Returns false for calls that have already ended.
    pub async fn terminate_call(&self, call_id: &str, reason: &str) -> AppResult<bool> {
        let record = self.load_call(call_id).await?;
        if !record.status.is_active() {
            return Ok(false);
        }
        let terminated = self
            .terminator
            .terminate_for_insufficient_balance(&record, reason)
            .await?;
        self.count_termination(terminated);
        Ok(terminated)
    }

    /// Cut a live call regardless of grace period or the auto-terminate toggle
    pub async fn emergency_terminate(&self, call_id: &str, reason: &str) -> AppResult<bool> {
        let record = self.load_call(call_id).await?;
        if !record.status.is_active() {
            return Ok(false);
        }
        let terminated = self.terminator.emergency_terminate(&record, reason).await?;
        self.count_termination(terminated);
        Ok(terminated)
    }

    /// Evaluate every in-progress call once
    #[instrument(skip(self))]
    pub async fn process_batch(&self) -> AppResult<BatchReport> {
        let started = Instant::now();
        let expired_sessions = match self.sessions.purge_expired().await {
            Ok(purged) => purged,
            Err(e) => {
                warn!("Session sweep failed: {}", e);
                0
            }
        };
        let calls = self.calls.list_in_progress().await?;

        let outcomes: Vec<(String, AppResult<TickOutcome>)> = stream::iter(calls)
            .map(|record| async move {
                let outcome = self.evaluate(&record).await;
                (record.call_id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = BatchReport {
            expired_sessions,
            ..Default::default()
        };
        for (call_id, outcome) in &outcomes {
            if let Err(e) = outcome {
                error!(call_id = %call_id, "Periodic billing failed: {}", e);
            }
            report.record(outcome);
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        Ok(report)
    }

    /// Snapshot of live sessions and lifetime counters
    pub async fn statistics(&self) -> AppResult<BillingStatistics> {
        let enabled = self.settings.current().await.real_time_billing_enabled;
        let call_ids = self.sessions.active_call_ids().await?;

        let mut stats = BillingStatistics {
            enabled,
            active_sessions: 0,
            total_current_cost: Decimal::ZERO,
            total_reserved: Decimal::ZERO,
            total_billable_seconds: 0,
            counters: self.counters.snapshot(),
        };
        for call_id in call_ids {
            // Sessions can end between listing and reading
            if let Some(session) = self.sessions.get(&call_id).await? {
                stats.active_sessions += 1;
                stats.total_current_cost += session.current_cost;
                stats.total_reserved += session.reserved_amount;
                stats.total_billable_seconds += session.billable_duration;
            }
        }

        Ok(stats)
    }

    async fn load_call(&self, call_id: &str) -> AppResult<CallRecord> {
        self.calls
            .find_by_call_id(call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))
    }

    fn count_termination(&self, terminated: bool) {
        if terminated {
            EngineCounters::bump(&self.counters.terminations);
            EngineCounters::bump(&self.counters.finalizations);
        } else {
            EngineCounters::bump(&self.counters.termination_failures);
        }
    }
}

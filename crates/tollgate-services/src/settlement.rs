//! End-of-call settlement
//!
//! Computes the final cost of a call and commits it through
//! `LedgerStore::settle_call`, which debits the balance and writes the
//! call's cost fields in one transaction. With a live billing session the
//! rate snapshot taken at call start is used; without one the rate is
//! resolved again from the call record. Either way every call is billed
//! exactly once.

use crate::rate_resolver::RateResolver;
use crate::settings::SettingsProvider;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::{
    billing::{self, IncrementConfig},
    models::{CallRecord, CallSettlement, SettleOutcome},
    traits::{CallRecordRepository, LedgerStore, SessionStore},
    AppError, AppResult,
};
use tracing::{debug, error, info, instrument, warn};

/// Pricing inputs for one call
struct Pricing {
    rate_per_minute: Decimal,
    billing_config: IncrementConfig,
    minimum_duration: i64,
}

pub struct SettlementService {
    calls: Arc<dyn CallRecordRepository>,
    ledger: Arc<dyn LedgerStore>,
    sessions: Arc<dyn SessionStore>,
    rates: Arc<RateResolver>,
    settings: Arc<dyn SettingsProvider>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl SettlementService {
    pub fn new(
        calls: Arc<dyn CallRecordRepository>,
        ledger: Arc<dyn LedgerStore>,
        sessions: Arc<dyn SessionStore>,
        rates: Arc<RateResolver>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            calls,
            ledger,
            sessions,
            rates,
            settings,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }

    /// Retry policy for transient persistence failures
    pub fn with_retry(mut self, max_attempts: u32, retry_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = retry_backoff;
        self
    }

    /// Settle a call
    ///
    /// Returns `Ok(true)` once the call is settled, including when it already
    /// was. Returns `Ok(false)` when no rate applies; the call is then flagged
    /// with `billing_status = error` and left for an operator.
    #[instrument(skip(self, record), fields(call_id = %record.call_id))]
    pub async fn finalize_billing(&self, record: &CallRecord) -> AppResult<bool> {
        if record.is_settled() {
            debug!("Call already settled");
            return Ok(true);
        }

        let _guard = self.sessions.lock(&record.call_id).await?;
        let session = self.sessions.get(&record.call_id).await?;

        let pricing = match &session {
            Some(session) if session.matches(record) => Pricing {
                rate_per_minute: session.rate_per_minute,
                billing_config: session.billing_config,
                minimum_duration: session.minimum_duration,
            },
            _ => {
                debug!("No billing session, pricing from the call record");
                match self.rates.resolve(&record.destination).await {
                    Ok(resolved) => Pricing {
                        rate_per_minute: resolved.rate.rate_per_minute,
                        billing_config: resolved.billing_config,
                        minimum_duration: resolved.rate.minimum_duration,
                    },
                    Err(AppError::RateNotFound(destination)) => {
                        error!("Cannot settle call, no rate for {}", destination);
                        self.calls.mark_billing_error(&record.call_id).await?;
                        return Ok(false);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let settlement = self.price(record, &pricing, Utc::now()).await;
        match self.settle_with_retry(&settlement).await? {
            SettleOutcome::Settled {
                entry,
                billing_status,
            } => info!(
                user_id = record.user_id,
                cost = %settlement.cost,
                billable = settlement.billable_duration,
                status = %billing_status,
                "Call settled, balance {} -> {}",
                entry.balance_before,
                entry.balance_after
            ),
            SettleOutcome::AlreadySettled => debug!("Call was settled concurrently"),
        }

        if session.is_some() {
            if let Err(e) = self.sessions.delete(&record.call_id).await {
                // The TTL will reclaim it
                warn!("Failed to delete billing session: {}", e);
            }
        }

        Ok(true)
    }

    async fn price(&self, record: &CallRecord, pricing: &Pricing, now: DateTime<Utc>) -> CallSettlement {
        let settings = self.settings.current().await;
        let end_time = record.end_time.unwrap_or(now).max(record.start_time);
        let actual = (end_time - record.start_time).num_seconds();

        let billable = billing::billable_seconds(actual, pricing.billing_config, pricing.minimum_duration);
        let cost = billing::cost(
            billable,
            pricing.rate_per_minute,
            settings.billing_precision,
            settings.rounding_method,
        );

        CallSettlement {
            call_id: record.call_id.clone(),
            cost,
            actual_duration: actual,
            billable_duration: billable,
            end_time,
            description: format!("Call {} to {}", record.call_id, record.destination),
        }
    }

    async fn settle_with_retry(&self, settlement: &CallSettlement) -> AppResult<SettleOutcome> {
        let mut attempt = 1;
        loop {
            match self.ledger.settle_call(settlement).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(attempt, "Settlement failed, retrying: {}", e);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempt, "Settlement failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

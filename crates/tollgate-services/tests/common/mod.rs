//! Shared wiring for the service integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use mockall::mock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tollgate_cache::MemorySessionStore;
use tollgate_core::models::{
    Account, AccountType, CallRecord, CallSettlement, CallStatus, LedgerEntry, LedgerRequest, Rate,
    RateTier, SettleOutcome,
};
use tollgate_core::traits::{
    AccountRepository, CallControl, CallRecordRepository, HangupResult, LedgerStore,
    RateRepository, SettingsRepository,
};
use tollgate_core::{AppError, AppResult, BillingSettings};
use tollgate_db::InMemoryStore;
use tollgate_services::{
    CachedSettingsProvider, RateResolver, RealtimeBillingEngine, SettingsProvider,
    SettlementService, TerminationCoordinator,
};

mock! {
    pub Control {}

    #[async_trait]
    impl CallControl for Control {
        async fn hangup(&self, call_id: &str) -> AppResult<HangupResult>;
    }
}

/// A control that never expects to be called
pub fn no_hangup() -> MockControl {
    let mut control = MockControl::new();
    control.expect_hangup().never();
    control
}

pub fn hangup_ok(times: usize) -> MockControl {
    let mut control = MockControl::new();
    control
        .expect_hangup()
        .times(times)
        .returning(|_| Ok(HangupResult::ok("+OK")));
    control
}

/// Switch that answers after `delay`
pub struct SlowControl {
    pub delay: Duration,
}

#[async_trait]
impl CallControl for SlowControl {
    async fn hangup(&self, _call_id: &str) -> AppResult<HangupResult> {
        tokio::time::sleep(self.delay).await;
        Ok(HangupResult::ok("+OK"))
    }
}

/// Ledger whose first `failures` settlements fail with a transaction error
pub struct FlakyLedger {
    pub inner: Arc<InMemoryStore>,
    pub failures: u32,
    pub attempts: AtomicU32,
}

#[async_trait]
impl LedgerStore for FlakyLedger {
    async fn apply_entry(&self, request: &LedgerRequest) -> AppResult<LedgerEntry> {
        self.inner.apply_entry(request).await
    }

    async fn settle_call(&self, settlement: &CallSettlement) -> AppResult<SettleOutcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(AppError::Transaction("could not serialize access".into()));
        }
        self.inner.settle_call(settlement).await
    }

    async fn history(&self, user_id: i64, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        self.inner.history(user_id, limit).await
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub settings: Arc<CachedSettingsProvider>,
    pub engine: Arc<RealtimeBillingEngine>,
}

pub struct HarnessBuilder {
    store: Arc<InMemoryStore>,
    control: Arc<dyn CallControl>,
    ledger: Option<Arc<dyn LedgerStore>>,
    hangup_timeout: Duration,
}

impl HarnessBuilder {
    pub fn new(control: impl CallControl + 'static) -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            control: Arc::new(control),
            ledger: None,
            hangup_timeout: Duration::from_millis(200),
        }
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        self.store.clone()
    }

    pub async fn setting(self, key: &str, value: &str) -> Self {
        self.store.set(key, value).await.unwrap();
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn LedgerStore>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn hangup_timeout(mut self, timeout: Duration) -> Self {
        self.hangup_timeout = timeout;
        self
    }

    pub fn build(self) -> Harness {
        let store = self.store;
        let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(5)));
        let settings = Arc::new(CachedSettingsProvider::new(
            store.clone(),
            BillingSettings::default(),
            Duration::from_secs(60),
        ));
        let provider: Arc<dyn SettingsProvider> = settings.clone();
        let rates = Arc::new(RateResolver::new(
            store.clone(),
            provider.clone(),
            Duration::from_secs(60),
        ));
        let ledger: Arc<dyn LedgerStore> = match self.ledger {
            Some(ledger) => ledger,
            None => store.clone() as Arc<dyn LedgerStore>,
        };

        let settlement = Arc::new(
            SettlementService::new(
                store.clone(),
                ledger,
                sessions.clone(),
                rates.clone(),
                provider.clone(),
            )
            .with_retry(3, Duration::from_millis(1)),
        );
        let terminator = Arc::new(TerminationCoordinator::new(
            self.control,
            store.clone(),
            sessions.clone(),
            settlement.clone(),
            self.hangup_timeout,
            3600,
        ));
        let engine = Arc::new(
            RealtimeBillingEngine::new(
                rates,
                provider,
                sessions.clone(),
                store.clone(),
                store.clone(),
                settlement,
                terminator,
                3600,
            )
            .with_concurrency(4),
        );

        Harness {
            store,
            sessions,
            settings,
            engine,
        }
    }
}

pub async fn account(store: &InMemoryStore, account_type: AccountType, balance: Decimal) -> i64 {
    AccountRepository::create(
        store,
        &Account {
            account_type,
            balance,
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .id
}

pub async fn rate(store: &InMemoryStore, prefix: &str, per_minute: Decimal, increment: &str, minimum_duration: i64) {
    RateRepository::create(
        store,
        &Rate {
            tier: RateTier::Destination,
            destination_prefix: prefix.to_string(),
            rate_per_minute: per_minute,
            minimum_duration,
            billing_increment: Some(increment.to_string()),
            effective_date: Utc::now() - ChronoDuration::days(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
}

/// An in-progress call that started `started_secs_ago` seconds ago
pub async fn live_call(
    store: &InMemoryStore,
    call_id: &str,
    user_id: i64,
    destination: &str,
    started_secs_ago: i64,
) -> CallRecord {
    let mut call = CallRecord::new(call_id, user_id, destination);
    call.status = CallStatus::InProgress;
    call.start_time = Utc::now() - ChronoDuration::seconds(started_secs_ago);
    CallRecordRepository::create(store, &call).await.unwrap()
}

pub async fn stored(store: &InMemoryStore, call_id: &str) -> CallRecord {
    store.find_by_call_id(call_id).await.unwrap().unwrap()
}

//! HTTP tests for the billing and account endpoints over in-memory stores

use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tollgate_api::{configure_routes, AppState};
use tollgate_cache::MemorySessionStore;
use tollgate_core::models::{Account, AccountType, CallRecord, CallStatus, Rate};
use tollgate_core::traits::{
    AccountRepository, CallControl, CallRecordRepository, HangupResult, RateRepository,
};
use tollgate_core::{AppResult, BillingSettings};
use tollgate_db::InMemoryStore;
use tollgate_services::{
    BalanceLedger, CachedSettingsProvider, RateResolver, RealtimeBillingEngine, SettingsProvider,
    SettlementService, TerminationCoordinator,
};

struct AcceptingSwitch;

#[async_trait]
impl CallControl for AcceptingSwitch {
    async fn hangup(&self, _call_id: &str) -> AppResult<HangupResult> {
        Ok(HangupResult::ok("+OK"))
    }
}

fn app_state(store: Arc<InMemoryStore>) -> AppState {
    let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(5)));
    let settings: Arc<dyn SettingsProvider> = Arc::new(CachedSettingsProvider::new(
        store.clone(),
        BillingSettings::default(),
        Duration::from_secs(60),
    ));
    let rates = Arc::new(RateResolver::new(
        store.clone(),
        settings.clone(),
        Duration::from_secs(60),
    ));
    let settlement = Arc::new(SettlementService::new(
        store.clone(),
        store.clone(),
        sessions.clone(),
        rates.clone(),
        settings.clone(),
    ));
    let terminator = Arc::new(TerminationCoordinator::new(
        Arc::new(AcceptingSwitch),
        store.clone(),
        sessions.clone(),
        settlement.clone(),
        Duration::from_secs(1),
        3600,
    ));
    let engine = Arc::new(RealtimeBillingEngine::new(
        rates.clone(),
        settings.clone(),
        sessions,
        store.clone(),
        store.clone(),
        settlement,
        terminator,
        3600,
    ));

    AppState {
        engine,
        calls: store.clone(),
        ledger: Arc::new(BalanceLedger::new(store.clone(), store)),
        rates,
        settings,
    }
}

/// One prepaid account with 10.00, a 6/6 rate on "1" and a call 65s in
async fn seeded_store() -> (Arc<InMemoryStore>, i64) {
    let store = Arc::new(InMemoryStore::new());
    let user = AccountRepository::create(
        store.as_ref(),
        &Account {
            account_type: AccountType::Prepaid,
            balance: dec!(10.00),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .id;
    RateRepository::create(
        store.as_ref(),
        &Rate {
            destination_prefix: "1".to_string(),
            rate_per_minute: dec!(0.05),
            billing_increment: Some("6/6".to_string()),
            effective_date: Utc::now() - ChronoDuration::days(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let mut call = CallRecord::new("call-1", user, "15551234");
    call.start_time = Utc::now() - ChronoDuration::seconds(65);
    CallRecordRepository::create(store.as_ref(), &call)
        .await
        .unwrap();

    (store, user)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_health() {
    let store = Arc::new(InMemoryStore::new());
    let app = app!(app_state(store));

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
}

#[actix_rt::test]
async fn test_call_lifecycle() {
    let (store, user) = seeded_store().await;
    let app = app!(app_state(store.clone()));

    let req = test::TestRequest::post()
        .uri("/api/v1/billing/calls/call-1/start")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["started"], true);

    let req = test::TestRequest::post()
        .uri("/api/v1/billing/process")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["processed"], 1);
    assert_eq!(body["data"]["untracked"], 0);

    let req = test::TestRequest::get()
        .uri("/api/v1/billing/stats")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["active_sessions"], 1);
    assert_eq!(body["data"]["counters"]["periodic_checks"], 1);

    let req = test::TestRequest::post()
        .uri("/api/v1/billing/calls/call-1/finalize")
        .set_json(json!({ "status": "completed" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["settled"], true);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["billing_status"], "paid");

    let record = store.find_by_call_id("call-1").await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Completed);
    assert_eq!(store.debits_for_call("call-1"), 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/accounts/{}/balance", user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let balance: rust_decimal::Decimal = body["data"]["balance"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(balance, dec!(10.00) - record.cost.unwrap());
}

#[actix_rt::test]
async fn test_finalize_rejects_live_status() {
    let (store, _) = seeded_store().await;
    let app = app!(app_state(store));

    let req = test::TestRequest::post()
        .uri("/api/v1/billing/calls/call-1/finalize")
        .set_json(json!({ "status": "in_progress" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn test_unknown_call_is_not_found() {
    let (store, _) = seeded_store().await;
    let app = app!(app_state(store));

    let req = test::TestRequest::post()
        .uri("/api/v1/billing/calls/missing/start")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "call_not_found");
}

#[actix_rt::test]
async fn test_emergency_terminate() {
    let (store, _) = seeded_store().await;
    let app = app!(app_state(store.clone()));

    let req = test::TestRequest::post()
        .uri("/api/v1/billing/calls/call-1/start")
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/billing/calls/call-1/terminate")
        .set_json(json!({ "reason": "fraud", "emergency": true }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["terminated"], true);

    let record = store.find_by_call_id("call-1").await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Terminated);
    assert_eq!(record.termination_reason.as_deref(), Some("fraud"));
    assert!(record.cost.is_some());

    // Terminating again reports false rather than failing
    let req = test::TestRequest::post()
        .uri("/api/v1/billing/calls/call-1/terminate")
        .set_json(json!({ "reason": "fraud" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["terminated"], false);
}

#[actix_rt::test]
async fn test_topup_and_ledger() {
    let (store, user) = seeded_store().await;
    let app = app!(app_state(store));

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/accounts/{}/topup", user))
        .set_json(json!({ "amount": "5.00", "reason": "Card payment" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["balance"], "15.00");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/accounts/{}/topup", user))
        .set_json(json!({ "amount": "-1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/accounts/{}/ledger?limit=10", user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["description"], "Card payment");
}

#[actix_rt::test]
async fn test_invalidate_reloads_settings() {
    let store = Arc::new(InMemoryStore::new());
    let state = app_state(store.clone());
    let app = app!(state);

    tollgate_core::traits::SettingsRepository::set(
        store.as_ref(),
        "grace_period_seconds",
        "45",
    )
    .await
    .unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/billing/settings/invalidate")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["grace_period_seconds"], 45);
}

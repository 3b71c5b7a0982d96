//! Behaviour of the in-memory store that the billing services rely on

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use tollgate_core::models::{
    Account, AccountType, BillingStatus, CallRecord, CallSettlement, CallStatus, EntryType,
    LedgerRequest, Rate, RateTier, SettleOutcome,
};
use tollgate_core::traits::{
    AccountRepository, CallRecordRepository, LedgerStore, RateRepository, SettingsRepository,
};
use tollgate_core::AppError;
use tollgate_db::InMemoryStore;

async fn account(store: &InMemoryStore, account_type: AccountType, balance: rust_decimal::Decimal) -> Account {
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
}

fn rate(tier: RateTier, prefix: &str, per_minute: rust_decimal::Decimal) -> Rate {
    Rate {
        tier,
        destination_prefix: prefix.to_string(),
        rate_per_minute: per_minute,
        effective_date: Utc::now() - Duration::days(1),
        ..Default::default()
    }
}

fn settlement(call_id: &str, cost: rust_decimal::Decimal) -> CallSettlement {
    CallSettlement {
        call_id: call_id.to_string(),
        cost,
        actual_duration: 65,
        billable_duration: 66,
        end_time: Utc::now(),
        description: format!("Call {}", call_id),
    }
}

#[tokio::test]
async fn test_longest_prefix_wins() {
    let store = InMemoryStore::new();
    RateRepository::create(&store, &rate(RateTier::Destination, "1", dec!(0.02)))
        .await
        .unwrap();
    RateRepository::create(&store, &rate(RateTier::Destination, "1800", dec!(0.00)))
        .await
        .unwrap();

    let found = store
        .find_by_destination(RateTier::Destination, "+1 800 555 1234", Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.destination_prefix, "1800");

    let found = store
        .find_by_destination(RateTier::Destination, "12125551234", Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.destination_prefix, "1");
}

#[tokio::test]
async fn test_tiers_are_separate() {
    let store = InMemoryStore::new();
    RateRepository::create(&store, &rate(RateTier::Country, "44", dec!(0.10)))
        .await
        .unwrap();

    let destination = store
        .find_by_destination(RateTier::Destination, "442071234567", Utc::now())
        .await
        .unwrap();
    assert!(destination.is_none());

    let country = store
        .find_by_destination(RateTier::Country, "442071234567", Utc::now())
        .await
        .unwrap();
    assert_eq!(country.unwrap().rate_per_minute, dec!(0.10));
}

#[tokio::test]
async fn test_future_and_inactive_rates_are_skipped() {
    let store = InMemoryStore::new();
    let now = Utc::now();

    RateRepository::create(&store, &rate(RateTier::Destination, "49", dec!(0.05)))
        .await
        .unwrap();
    RateRepository::create(
        &store,
        &Rate {
            effective_date: now + Duration::days(1),
            ..rate(RateTier::Destination, "49", dec!(0.50))
        },
    )
    .await
    .unwrap();
    RateRepository::create(
        &store,
        &Rate {
            active: false,
            ..rate(RateTier::Destination, "4930", dec!(0.90))
        },
    )
    .await
    .unwrap();

    let found = store
        .find_by_destination(RateTier::Destination, "493012345", now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.rate_per_minute, dec!(0.05));
}

#[tokio::test]
async fn test_opening_balance_is_a_ledger_entry() {
    let store = InMemoryStore::new();
    let acct = account(&store, AccountType::Prepaid, dec!(25.00)).await;

    assert_eq!(acct.balance, dec!(25.00));
    assert_eq!(store.ledger_sum(acct.id), dec!(25.00));

    let history = store.history(acct.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].entry_type, EntryType::Credit);
}

#[tokio::test]
async fn test_settle_call_is_atomic_and_idempotent() {
    let store = InMemoryStore::new();
    let acct = account(&store, AccountType::Prepaid, dec!(10.00)).await;
    let mut call = CallRecord::new("call-1", acct.id, "18005551234");
    call.status = CallStatus::InProgress;
    CallRecordRepository::create(&store, &call).await.unwrap();

    let outcome = store.settle_call(&settlement("call-1", dec!(0.055))).await.unwrap();
    match outcome {
        SettleOutcome::Settled {
            entry,
            billing_status,
        } => {
            assert_eq!(billing_status, BillingStatus::Paid);
            assert_eq!(entry.balance_after, dec!(9.945));
            assert!(entry.is_consistent());
        }
        SettleOutcome::AlreadySettled => panic!("first settlement must write"),
    }

    let again = store.settle_call(&settlement("call-1", dec!(0.055))).await.unwrap();
    assert_eq!(again, SettleOutcome::AlreadySettled);

    let stored = store.find_by_call_id("call-1").await.unwrap().unwrap();
    assert_eq!(stored.cost, Some(dec!(0.055)));
    assert_eq!(stored.status, CallStatus::Completed);
    assert_eq!(store.debits_for_call("call-1"), 1);
    assert_eq!(store.ledger_sum(acct.id), dec!(9.945));
}

#[tokio::test]
async fn test_settle_unknown_call() {
    let store = InMemoryStore::new();
    let err = store.settle_call(&settlement("ghost", dec!(1))).await.unwrap_err();
    assert!(matches!(err, AppError::CallNotFound(_)));
}

#[tokio::test]
async fn test_terminated_call_keeps_terminated_status() {
    let store = InMemoryStore::new();
    let acct = account(&store, AccountType::Prepaid, dec!(0.01)).await;
    let mut call = CallRecord::new("call-2", acct.id, "18005551234");
    call.status = CallStatus::InProgress;
    CallRecordRepository::create(&store, &call).await.unwrap();

    assert!(store.mark_terminated("call-2", Utc::now(), "insufficient balance").await.unwrap());
    // A second termination is a no-op
    assert!(!store.mark_terminated("call-2", Utc::now(), "again").await.unwrap());

    let outcome = store.settle_call(&settlement("call-2", dec!(5.00))).await.unwrap();
    assert!(matches!(
        outcome,
        SettleOutcome::Settled {
            billing_status: BillingStatus::Terminated,
            ..
        }
    ));

    let stored = store.find_by_call_id("call-2").await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Terminated);
    assert_eq!(stored.termination_reason.as_deref(), Some("insufficient balance"));
    assert_eq!(
        AccountRepository::find_by_id(&store, acct.id).await.unwrap().unwrap().balance,
        dec!(-4.99)
    );
}

#[tokio::test]
async fn test_mark_ended_only_once() {
    let store = InMemoryStore::new();
    let acct = account(&store, AccountType::Postpaid, dec!(0)).await;
    let call = CallRecord::new("call-3", acct.id, "4420");
    CallRecordRepository::create(&store, &call).await.unwrap();

    let started = store.mark_in_progress("call-3").await.unwrap().unwrap();
    assert_eq!(started.status, CallStatus::InProgress);
    assert_eq!(store.list_in_progress().await.unwrap().len(), 1);

    let first_end = Utc::now();
    let ended = store
        .mark_ended("call-3", CallStatus::Completed, first_end)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ended.end_time, Some(first_end.max(ended.start_time)));

    let again = store
        .mark_ended("call-3", CallStatus::Failed, first_end + Duration::seconds(30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.status, CallStatus::Completed);
    assert_eq!(again.end_time, ended.end_time);
    assert!(store.list_in_progress().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_call_is_conflict() {
    let store = InMemoryStore::new();
    let acct = account(&store, AccountType::Prepaid, dec!(1)).await;
    let call = CallRecord::new("dup", acct.id, "1");
    CallRecordRepository::create(&store, &call).await.unwrap();

    let err = CallRecordRepository::create(&store, &call).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_manual_entries_and_history_order() {
    let store = InMemoryStore::new();
    let acct = account(&store, AccountType::Prepaid, dec!(0)).await;

    for (entry_type, amount) in [
        (EntryType::Credit, dec!(20)),
        (EntryType::Debit, dec!(5)),
        (EntryType::Credit, dec!(1.5)),
    ] {
        store
            .apply_entry(&LedgerRequest {
                user_id: acct.id,
                entry_type,
                amount,
                description: "manual".to_string(),
                call_id: None,
            })
            .await
            .unwrap();
    }

    let history = store.history(acct.id, 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].amount, dec!(1.5));
    assert_eq!(history[0].balance_after, dec!(16.5));
    assert_eq!(store.ledger_sum(acct.id), dec!(16.5));
}

#[tokio::test]
async fn test_settings_roundtrip() {
    let store = InMemoryStore::new();
    store.set("grace_period_seconds", "30").await.unwrap();
    store.set("grace_period_seconds", "45").await.unwrap();

    let all = store.load_all().await.unwrap();
    assert_eq!(all.get("grace_period_seconds").map(String::as_str), Some("45"));
}

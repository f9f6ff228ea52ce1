//! Integration tests for the settlement engine
//!
//! Runs against the in-memory ledger store and bus, so the full
//! escrow-funding -> settlement -> notification flow is exercised without
//! external infrastructure.

use std::sync::Arc;

use event_bus::{EventBus, InMemoryBus};
use futures::StreamExt;
use settlement_rs::models::{
    AccountOwner, OwnerType, SettlementStatus, TransactionKind, TransactionStatus,
};
use settlement_rs::store::{FundingOutcome, LedgerStore};
use settlement_rs::{
    FeePolicy, FeePolicyConfig, InMemoryLedgerStore, OrderSnapshot, SettlementEngine,
    SettlementError, SettlementNotifier, SettlementOutcome,
};

fn setup() -> (SettlementEngine, InMemoryLedgerStore, InMemoryBus) {
    let store = InMemoryLedgerStore::new();
    let bus = InMemoryBus::new();

    let policy = FeePolicy::new(FeePolicyConfig {
        platform_fee_rate: 10,
        driver_commission_rate: 30,
    })
    .expect("valid test policy");

    let bus_handle: Arc<dyn EventBus> = Arc::new(bus.clone());
    let notifier = SettlementNotifier::new(bus_handle);
    let engine = SettlementEngine::new(Arc::new(store.clone()), policy, notifier);

    (engine, store, bus)
}

fn delivered_order() -> OrderSnapshot {
    OrderSnapshot {
        order_id: "ord_1029".to_string(),
        restaurant_id: "rest_17".to_string(),
        driver_id: Some("drv_42".to_string()),
        order_code: "FD-2026-001029".to_string(),
        subtotal_minor: 100_000,
        delivery_fee_minor: 15_000,
        tip_minor: 5_000,
    }
}

#[tokio::test]
async fn test_settle_order_happy_path() {
    let (engine, store, bus) = setup();
    let order = delivered_order();

    engine.collect_order_payment(&order).await.unwrap();

    let mut notifications = bus.subscribe("wallet.events.>").await.unwrap();

    let outcome = engine.settle_order(&order).await.unwrap();
    let transaction_ids = match outcome {
        SettlementOutcome::Settled { transaction_ids } => transaction_ids,
        other => panic!("expected Settled, got {:?}", other),
    };
    assert_eq!(transaction_ids.len(), 3);

    // Balances: 10% of subtotal + 30% of delivery fee retained by the
    // platform; the rest reaches the restaurant and driver.
    let platform = store
        .find_account(&AccountOwner::Platform)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(platform.balance_minor, 14_500);
    assert_eq!(platform.escrow_minor, 0);

    let restaurant = store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restaurant.balance_minor, 90_000);

    let driver = store
        .find_account(&AccountOwner::driver("drv_42"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(driver.balance_minor, 15_500);

    // Audit trail: one deposit plus the three settlement credits, all
    // completed and tied to the order.
    let transactions = store.transactions_for_order("ord_1029").await.unwrap();
    assert_eq!(transactions.len(), 4);
    assert!(transactions
        .iter()
        .all(|t| t.status == TransactionStatus::Completed));
    assert!(transactions
        .iter()
        .all(|t| t.order_code.as_deref() == Some("FD-2026-001029")));

    let credited: i64 = transactions
        .iter()
        .filter(|t| t.kind != TransactionKind::Deposit)
        .map(|t| t.amount_minor)
        .sum();
    assert_eq!(credited, 120_000); // conservation: credits == gross

    // Marker: completed, stamped with the result
    let record = store.settlement_record("ord_1029").await.unwrap().unwrap();
    assert_eq!(record.status, SettlementStatus::Completed);
    assert_eq!(record.result_transaction_ids, transaction_ids);
    assert!(record.completed_at.is_some());

    // Notifications: one settlement.completed, then one balance.updated
    // per touched account (platform, restaurant, driver).
    let mut subjects = Vec::new();
    for _ in 0..4 {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(1), notifications.next())
            .await
            .expect("timeout waiting for notification")
            .expect("notification stream ended");
        subjects.push(msg.subject);
    }
    assert_eq!(subjects[0], "wallet.events.settlement.completed");
    assert_eq!(
        subjects[1..]
            .iter()
            .filter(|s| s.as_str() == "wallet.events.balance.updated")
            .count(),
        3
    );
}

#[tokio::test]
async fn test_settle_order_sequential_duplicate_is_noop() {
    let (engine, store, _bus) = setup();
    let order = delivered_order();

    engine.collect_order_payment(&order).await.unwrap();

    let first = engine.settle_order(&order).await.unwrap();
    assert!(matches!(first, SettlementOutcome::Settled { .. }));

    let second = engine.settle_order(&order).await.unwrap();
    assert_eq!(second, SettlementOutcome::AlreadySettled);

    // Exactly one set of credits; the duplicate moved nothing
    let transactions = store.transactions_for_order("ord_1029").await.unwrap();
    assert_eq!(transactions.len(), 4); // deposit + 3 credits

    let restaurant = store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restaurant.balance_minor, 90_000);
}

#[tokio::test]
async fn test_settle_order_concurrent_duplicate_single_winner() {
    let (engine, store, _bus) = setup();
    let order = delivered_order();

    engine.collect_order_payment(&order).await.unwrap();

    let (a, b) = tokio::join!(engine.settle_order(&order), engine.settle_order(&order));

    let settled_count = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Ok(SettlementOutcome::Settled { .. })))
        .count();
    assert_eq!(settled_count, 1, "exactly one caller settles: {:?} / {:?}", a, b);

    // The loser either saw the completed marker or hit the in-progress gate
    for result in [a, b] {
        match result {
            Ok(SettlementOutcome::Settled { .. }) => {}
            Ok(SettlementOutcome::AlreadySettled) => {}
            Err(SettlementError::InProgress(order_id)) => assert_eq!(order_id, "ord_1029"),
            other => panic!("unexpected concurrent outcome: {:?}", other),
        }
    }

    // Funds moved exactly once
    let transactions = store.transactions_for_order("ord_1029").await.unwrap();
    assert_eq!(transactions.len(), 4);

    let record = store.settlement_record("ord_1029").await.unwrap().unwrap();
    assert_eq!(record.status, SettlementStatus::Completed);
}

#[tokio::test]
async fn test_no_driver_share_retained_by_platform() {
    let (engine, store, _bus) = setup();
    let mut order = delivered_order();
    order.driver_id = None;

    engine.collect_order_payment(&order).await.unwrap();
    let outcome = engine.settle_order(&order).await.unwrap();

    match outcome {
        SettlementOutcome::Settled { transaction_ids } => {
            assert_eq!(transaction_ids.len(), 2) // revenue + platform retained
        }
        other => panic!("expected Settled, got {:?}", other),
    }

    // No driver account was touched and no commission transaction exists
    let transactions = store.transactions_for_order("ord_1029").await.unwrap();
    assert!(transactions
        .iter()
        .all(|t| t.kind != TransactionKind::Commission));
    assert!(store
        .all_transactions()
        .iter()
        .all(|t| t.kind != TransactionKind::Commission));

    // Platform retains fee + commission + the would-be driver payment
    let platform = store
        .find_account(&AccountOwner::Platform)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(platform.balance_minor, 10_000 + 4_500 + 15_500);
    assert_eq!(platform.escrow_minor, 0);

    let restaurant = store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restaurant.balance_minor, 90_000);

    // Conservation: everything collected was distributed
    assert_eq!(
        platform.balance_minor + restaurant.balance_minor,
        order.gross_minor()
    );
}

#[tokio::test]
async fn test_fully_discounted_order_creates_no_revenue_transaction() {
    let (engine, store, _bus) = setup();
    let mut order = delivered_order();
    order.subtotal_minor = 0;

    engine.collect_order_payment(&order).await.unwrap();
    engine.settle_order(&order).await.unwrap();

    let transactions = store.transactions_for_order("ord_1029").await.unwrap();
    assert!(transactions
        .iter()
        .all(|t| t.kind != TransactionKind::OrderRevenue));
    // Zero-value transactions are never recorded
    assert!(transactions.iter().all(|t| t.amount_minor > 0));

    // The restaurant account was never even created
    assert!(store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_zero_value_order_settles_without_transactions() {
    let (engine, store, _bus) = setup();
    let order = OrderSnapshot {
        order_id: "ord_free".to_string(),
        restaurant_id: "rest_17".to_string(),
        driver_id: None,
        order_code: "FD-FREE".to_string(),
        subtotal_minor: 0,
        delivery_fee_minor: 0,
        tip_minor: 0,
    };

    let funding = engine.collect_order_payment(&order).await.unwrap();
    assert!(matches!(funding, FundingOutcome::NothingDue));

    let outcome = engine.settle_order(&order).await.unwrap();
    assert_eq!(
        outcome,
        SettlementOutcome::Settled {
            transaction_ids: Vec::new()
        }
    );

    assert!(store
        .transactions_for_order("ord_free")
        .await
        .unwrap()
        .is_empty());

    let record = store.settlement_record("ord_free").await.unwrap().unwrap();
    assert_eq!(record.status, SettlementStatus::Completed);
}

#[tokio::test]
async fn test_underfunded_escrow_fails_atomically_then_retry_succeeds() {
    let (engine, store, bus) = setup();
    let order = delivered_order();

    // Escrow holds far less than the order's gross amount
    store.fund_escrow("ord_1029", "FD-2026-001029", 1_000).await.unwrap();

    let mut failures = bus
        .subscribe("wallet.events.settlement.failed")
        .await
        .unwrap();

    let err = engine.settle_order(&order).await.unwrap_err();
    assert!(matches!(err, SettlementError::Store(_)));
    assert!(err.is_retriable());

    // Atomicity: no partial credits anywhere, escrow untouched
    let platform = store
        .find_account(&AccountOwner::Platform)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(platform.balance_minor, 0);
    assert_eq!(platform.escrow_minor, 1_000);
    assert!(store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        store.transactions_for_order("ord_1029").await.unwrap().len(),
        1 // only the deposit
    );

    // Marker: failed, with the reason preserved for operators
    let record = store.settlement_record("ord_1029").await.unwrap().unwrap();
    assert_eq!(record.status, SettlementStatus::Failed);
    assert!(record
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("insufficient escrow"));

    // The failure was announced
    let msg = tokio::time::timeout(std::time::Duration::from_secs(1), failures.next())
        .await
        .expect("timeout waiting for failure notification")
        .expect("notification stream ended");
    assert_eq!(msg.subject, "wallet.events.settlement.failed");

    // Top up the escrow under another order and retry from the failed state
    store
        .fund_escrow("ord_backfill", "FD-BACKFILL", 119_000)
        .await
        .unwrap();

    let outcome = engine.settle_order(&order).await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Settled { .. }));

    let record = store.settlement_record("ord_1029").await.unwrap().unwrap();
    assert_eq!(record.status, SettlementStatus::Completed);

    let restaurant = store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restaurant.balance_minor, 90_000);
}

#[tokio::test]
async fn test_collect_order_payment_is_idempotent() {
    let (engine, store, _bus) = setup();
    let order = delivered_order();

    let first = engine.collect_order_payment(&order).await.unwrap();
    assert!(matches!(first, FundingOutcome::Funded(_)));

    let second = engine.collect_order_payment(&order).await.unwrap();
    assert!(matches!(second, FundingOutcome::AlreadyFunded));

    let platform = store
        .find_account(&AccountOwner::Platform)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(platform.escrow_minor, 120_000);

    let deposits: Vec<_> = store
        .all_transactions()
        .into_iter()
        .filter(|t| t.kind == TransactionKind::Deposit)
        .collect();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].amount_minor, 120_000);
}

#[tokio::test]
async fn test_invalid_order_rejected_before_marker_exists() {
    let (engine, store, _bus) = setup();
    let mut order = delivered_order();
    order.tip_minor = -5;

    let err = engine.settle_order(&order).await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));
    assert!(!err.is_retriable());

    // Garbage input never claims a marker or touches the ledger
    assert!(store
        .settlement_record("ord_1029")
        .await
        .unwrap()
        .is_none());
    assert!(store.all_transactions().is_empty());
}

#[tokio::test]
async fn test_balance_notification_carries_final_snapshot() {
    let (engine, store, bus) = setup();
    let order = delivered_order();

    engine.collect_order_payment(&order).await.unwrap();

    let mut updates = bus.subscribe("wallet.events.balance.updated").await.unwrap();

    engine.settle_order(&order).await.unwrap();

    let mut seen = std::collections::HashMap::new();
    for _ in 0..3 {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(1), updates.next())
            .await
            .expect("timeout waiting for balance update")
            .expect("stream ended");

        let envelope: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        let payload = &envelope["payload"];
        seen.insert(
            payload["owner_type"].as_str().unwrap().to_string(),
            payload["balance_minor"].as_i64().unwrap(),
        );
        assert_eq!(payload["order_id"], "ord_1029");
    }

    assert_eq!(seen["platform"], 14_500);
    assert_eq!(seen["restaurant"], 90_000);
    assert_eq!(seen["driver"], 15_500);

    // Snapshots match the store
    let driver = store
        .find_account(&AccountOwner::driver("drv_42"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(driver.owner_type, OwnerType::Driver);
    assert_eq!(driver.balance_minor, 15_500);
}

#[tokio::test]
async fn test_deactivated_account_still_receives_settlement() {
    // Deactivation gates payout visibility elsewhere; the ledger itself
    // keeps crediting so no money is ever dropped.
    let (engine, store, _bus) = setup();
    let order = delivered_order();

    let restaurant = store
        .resolve_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap();
    store.deactivate_account(restaurant.id).await.unwrap();

    engine.collect_order_payment(&order).await.unwrap();
    engine.settle_order(&order).await.unwrap();

    let reloaded = store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .unwrap();
    assert!(!reloaded.is_active);
    assert_eq!(reloaded.balance_minor, 90_000);
}

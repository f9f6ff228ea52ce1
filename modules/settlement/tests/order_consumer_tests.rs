//! Integration tests for the order-delivered consumer
//!
//! Exercises the full event path: an `orders.events.delivered` envelope on
//! the bus settles the order through the engine; duplicates are absorbed,
//! poisoned events and exhausted retries land in the dead letters.

use std::sync::Arc;
use std::time::Duration;

use event_bus::{EventBus, EventEnvelope, InMemoryBus};
use settlement_rs::models::{AccountOwner, SettlementStatus};
use settlement_rs::store::LedgerStore;
use settlement_rs::{
    start_order_delivered_consumer, FeePolicy, FeePolicyConfig, InMemoryLedgerStore,
    OrderSnapshot, SettlementEngine, SettlementNotifier,
};
use uuid::Uuid;

async fn setup_consumer() -> (Arc<dyn EventBus>, InMemoryLedgerStore, Arc<SettlementEngine>) {
    let store = InMemoryLedgerStore::new();
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());

    let policy = FeePolicy::new(FeePolicyConfig {
        platform_fee_rate: 10,
        driver_commission_rate: 30,
    })
    .expect("valid test policy");

    let store_handle: Arc<dyn LedgerStore> = Arc::new(store.clone());
    let notifier = SettlementNotifier::new(bus.clone());
    let engine = Arc::new(SettlementEngine::new(
        store_handle.clone(),
        policy,
        notifier,
    ));

    start_order_delivered_consumer(bus.clone(), store_handle, engine.clone()).await;

    // Give the spawned consumer a moment to subscribe before publishing
    tokio::time::sleep(Duration::from_millis(50)).await;

    (bus, store, engine)
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

async fn publish_delivered(bus: &Arc<dyn EventBus>, envelope: &EventEnvelope<OrderSnapshot>) {
    let payload = serde_json::to_vec(envelope).unwrap();
    bus.publish("orders.events.delivered", payload).await.unwrap();
}

async fn wait_for_settlement(
    store: &InMemoryLedgerStore,
    order_id: &str,
    status: SettlementStatus,
) -> bool {
    for _ in 0..200 {
        if let Some(record) = store.settlement_record(order_id).await.unwrap() {
            if record.status == status {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_dead_letter(store: &InMemoryLedgerStore) -> bool {
    for _ in 0..300 {
        if !store.dead_letters().is_empty() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_delivered_event_settles_order() {
    let (bus, store, engine) = setup_consumer().await;
    let order = delivered_order();

    engine.collect_order_payment(&order).await.unwrap();

    let envelope = EventEnvelope::new("orders".to_string(), order.clone());
    publish_delivered(&bus, &envelope).await;

    assert!(
        wait_for_settlement(&store, "ord_1029", SettlementStatus::Completed).await,
        "order should settle from the delivered event"
    );

    let restaurant = store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restaurant.balance_minor, 90_000);
}

#[tokio::test]
async fn test_duplicate_delivered_events_absorbed() {
    let (bus, store, engine) = setup_consumer().await;
    let order = delivered_order();

    engine.collect_order_payment(&order).await.unwrap();

    // The same logical event delivered twice (at-least-once trigger), plus
    // a second distinct event for the same order
    let envelope = EventEnvelope::new("orders".to_string(), order.clone());
    publish_delivered(&bus, &envelope).await;
    publish_delivered(&bus, &envelope).await;

    let another =
        EventEnvelope::with_event_id(Uuid::new_v4(), "orders".to_string(), order.clone());
    publish_delivered(&bus, &another).await;

    assert!(wait_for_settlement(&store, "ord_1029", SettlementStatus::Completed).await);

    // Let the duplicates drain, then verify nothing moved twice
    tokio::time::sleep(Duration::from_millis(200)).await;

    let transactions = store.transactions_for_order("ord_1029").await.unwrap();
    assert_eq!(transactions.len(), 4); // deposit + 3 settlement credits

    let restaurant = store
        .find_account(&AccountOwner::restaurant("rest_17"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restaurant.balance_minor, 90_000);

    assert!(store.dead_letters().is_empty());
}

#[tokio::test]
async fn test_unparseable_event_goes_to_dead_letters() {
    let (bus, store, _engine) = setup_consumer().await;

    bus.publish("orders.events.delivered", b"not json at all".to_vec())
        .await
        .unwrap();

    assert!(
        wait_for_dead_letter(&store).await,
        "poisoned payload should be dead-lettered"
    );

    let letters = store.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].subject, "orders.events.delivered");
    assert_eq!(letters[0].event_id, None);
    assert_eq!(letters[0].retry_count, 0);
}

#[tokio::test]
async fn test_invalid_order_goes_to_dead_letters_without_retry() {
    let (bus, store, _engine) = setup_consumer().await;

    let mut order = delivered_order();
    order.subtotal_minor = -100_000;

    let envelope = EventEnvelope::new("orders".to_string(), order);
    publish_delivered(&bus, &envelope).await;

    assert!(wait_for_dead_letter(&store).await);

    let letters = store.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].event_id, Some(envelope.event_id));
    assert_eq!(letters[0].retry_count, 0); // permanent failures skip retries
    assert!(letters[0].error.contains("invalid order"));

    // Nothing touched the ledger
    assert!(store.all_transactions().is_empty());
    assert!(store
        .settlement_record("ord_1029")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_transient_failure_exhausts_retries_then_dead_letters() {
    let (bus, store, _engine) = setup_consumer().await;
    let order = delivered_order();

    // Escrow never funded: every settlement attempt fails as a store error,
    // which the consumer treats as retriable.
    let envelope = EventEnvelope::new("orders".to_string(), order);
    publish_delivered(&bus, &envelope).await;

    assert!(
        wait_for_dead_letter(&store).await,
        "exhausted retries should dead-letter the event"
    );

    let letters = store.dead_letters();
    assert_eq!(letters.len(), 1);
    assert!(letters[0].retry_count > 0);
    assert!(letters[0].error.contains("insufficient escrow"));

    // The marker is left failed, eligible for a clean retry once escrow
    // is funded.
    let record = store.settlement_record("ord_1029").await.unwrap().unwrap();
    assert_eq!(record.status, SettlementStatus::Failed);
}

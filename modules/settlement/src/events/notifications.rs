//! Best-effort settlement notifications
//!
//! Pushes balance and settlement-status events to the bus for connected
//! clients. Delivery is strictly best-effort: a settled order is settled
//! whether or not anyone heard about it, so every publish failure is
//! logged and swallowed.

use std::sync::Arc;

use event_bus::{EventBus, EventEnvelope};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Account, BalanceUpdatedPayload, OrderSnapshot, SettlementCompletedPayload,
    SettlementFailedPayload,
};

const SOURCE_MODULE: &str = "settlement";

pub const BALANCE_UPDATED_SUBJECT: &str = "wallet.events.balance.updated";
pub const SETTLEMENT_COMPLETED_SUBJECT: &str = "wallet.events.settlement.completed";
pub const SETTLEMENT_FAILED_SUBJECT: &str = "wallet.events.settlement.failed";

/// Publisher for wallet notification events
#[derive(Clone)]
pub struct SettlementNotifier {
    bus: Arc<dyn EventBus>,
}

impl SettlementNotifier {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Announce an account's post-settlement balance
    pub async fn balance_updated(&self, order_id: &str, account: &Account) {
        self.publish(
            BALANCE_UPDATED_SUBJECT,
            BalanceUpdatedPayload {
                account_id: account.id,
                owner_type: account.owner_type,
                owner_id: account.owner_id.clone(),
                balance_minor: account.balance_minor,
                escrow_minor: account.escrow_minor,
                order_id: order_id.to_string(),
            },
        )
        .await;
    }

    /// Announce a completed settlement
    pub async fn settlement_completed(&self, order: &OrderSnapshot, transaction_ids: &[Uuid]) {
        self.publish(
            SETTLEMENT_COMPLETED_SUBJECT,
            SettlementCompletedPayload {
                order_id: order.order_id.clone(),
                order_code: order.order_code.clone(),
                transaction_ids: transaction_ids.to_vec(),
            },
        )
        .await;
    }

    /// Announce a failed settlement attempt (operators subscribe to this)
    pub async fn settlement_failed(&self, order_id: &str, reason: &str) {
        self.publish(
            SETTLEMENT_FAILED_SUBJECT,
            SettlementFailedPayload {
                order_id: order_id.to_string(),
                reason: reason.to_string(),
            },
        )
        .await;
    }

    async fn publish<T: Serialize>(&self, subject: &str, payload: T) {
        let envelope = EventEnvelope::new(SOURCE_MODULE.to_string(), payload)
            .with_source_version(env!("CARGO_PKG_VERSION").to_string());

        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    subject = %subject,
                    error = %e,
                    "Failed to serialize notification, dropping"
                );
                return;
            }
        };

        if let Err(e) = self.bus.publish(subject, bytes).await {
            tracing::warn!(
                subject = %subject,
                event_id = %envelope.event_id,
                error = %e,
                "Failed to publish notification, dropping"
            );
        } else {
            tracing::debug!(
                subject = %subject,
                event_id = %envelope.event_id,
                "Notification published"
            );
        }
    }
}

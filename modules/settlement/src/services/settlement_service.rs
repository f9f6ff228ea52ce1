//! Settlement engine
//!
//! Orchestrates the settle-one-order operation: claim the idempotency
//! marker, compute the fee split, build the plan, apply it atomically
//! through the ledger store, finalize the marker, and notify. Also owns
//! the payment-capture side of the lifecycle (`collect_order_payment`),
//! which parks a delivered order's gross amount in the platform escrow.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::events::SettlementNotifier;
use crate::fee_policy::{FeePolicy, FeePolicyError, OrderAmounts};
use crate::models::OrderSnapshot;
use crate::services::settlement_plan::build_plan;
use crate::store::{
    AppliedSettlement, FundingOutcome, LedgerStore, SettlementGate, StoreError,
};
use crate::validation::{validate_order, ValidationError};

/// Errors from the settlement engine
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error("fee policy rejected order: {0}")]
    Policy(#[from] FeePolicyError),

    #[error("settlement already in progress for order {0}")]
    InProgress(String),

    #[error("ledger store failure: {0}")]
    Store(#[from] StoreError),

    #[error("account resolution failed: {0}")]
    AccountResolution(String),
}

impl SettlementError {
    /// Whether a retry of the same order can be expected to succeed
    ///
    /// Store failures are transient (the marker is left `failed`, so a
    /// retry re-runs the whole settlement); an in-progress conflict
    /// resolves itself once the competing attempt finishes. Validation and
    /// policy errors require the order event itself to be fixed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SettlementError::Store(_) | SettlementError::InProgress(_)
        )
    }
}

/// Result of a successful `settle_order` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Funds moved in this call
    Settled { transaction_ids: Vec<Uuid> },
    /// A previous call already moved the funds; nothing happened
    AlreadySettled,
}

/// The settlement engine
///
/// Cheap to clone via the shared store/bus handles; one instance serves
/// all concurrently settling orders.
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    policy: FeePolicy,
    notifier: SettlementNotifier,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn LedgerStore>, policy: FeePolicy, notifier: SettlementNotifier) -> Self {
        Self {
            store,
            policy,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Park a delivered order's collected payment in the platform escrow
    ///
    /// Idempotent per order; a zero-value order has nothing to hold and is
    /// reported as `NothingDue`.
    pub async fn collect_order_payment(
        &self,
        order: &OrderSnapshot,
    ) -> Result<FundingOutcome, SettlementError> {
        validate_order(order)?;

        let gross_minor = order.gross_minor();
        if gross_minor == 0 {
            return Ok(FundingOutcome::NothingDue);
        }

        let outcome = self
            .store
            .fund_escrow(&order.order_id, &order.order_code, gross_minor)
            .await?;

        match &outcome {
            FundingOutcome::Funded(record) => {
                tracing::info!(
                    order_id = %order.order_id,
                    transaction_id = %record.id,
                    amount_minor = gross_minor,
                    "Order payment collected into escrow"
                );
            }
            FundingOutcome::AlreadyFunded => {
                tracing::info!(
                    order_id = %order.order_id,
                    "Escrow already funded for order, skipping (idempotency)"
                );
            }
            FundingOutcome::NothingDue => {}
        }

        Ok(outcome)
    }

    /// Settle a delivered order: split the collected payment and move the
    /// funds, at most once
    ///
    /// Duplicate triggers are absorbed silently (`AlreadySettled`);
    /// concurrent triggers for the same order lose the marker race and get
    /// `SettlementError::InProgress`. Any failure after the marker is
    /// claimed moves it to `failed`, so the order stays eligible for a
    /// clean retry.
    pub async fn settle_order(
        &self,
        order: &OrderSnapshot,
    ) -> Result<SettlementOutcome, SettlementError> {
        validate_order(order)?;

        match self.store.begin_settlement(&order.order_id).await? {
            SettlementGate::Started => {}
            SettlementGate::AlreadySettled => {
                tracing::info!(
                    order_id = %order.order_id,
                    "Order already settled, skipping (idempotency)"
                );
                return Ok(SettlementOutcome::AlreadySettled);
            }
            SettlementGate::InProgressConflict => {
                tracing::warn!(
                    order_id = %order.order_id,
                    "Settlement already in progress for order, backing off"
                );
                return Err(SettlementError::InProgress(order.order_id.clone()));
            }
        }

        match self.execute(order).await {
            Ok(applied) => {
                let transaction_ids = applied.transaction_ids();
                self.store
                    .complete_settlement(&order.order_id, &transaction_ids)
                    .await?;

                tracing::info!(
                    order_id = %order.order_id,
                    order_code = %order.order_code,
                    transactions = transaction_ids.len(),
                    released_minor = order.gross_minor(),
                    "Order settled"
                );

                self.notifier
                    .settlement_completed(order, &transaction_ids)
                    .await;
                for account in &applied.accounts {
                    self.notifier.balance_updated(&order.order_id, account).await;
                }

                Ok(SettlementOutcome::Settled { transaction_ids })
            }
            Err(err) => {
                let reason = err.to_string();
                if let Err(mark_err) = self.store.fail_settlement(&order.order_id, &reason).await {
                    tracing::error!(
                        order_id = %order.order_id,
                        error = %reason,
                        mark_error = %mark_err,
                        "Failed to mark settlement as failed; marker left in progress for reconciliation"
                    );
                } else {
                    tracing::warn!(
                        order_id = %order.order_id,
                        error = %reason,
                        "Settlement failed, marker set to failed for retry"
                    );
                }

                self.notifier
                    .settlement_failed(&order.order_id, &reason)
                    .await;

                Err(err)
            }
        }
    }

    /// Compute the split and apply the plan; the caller owns marker
    /// finalization
    async fn execute(&self, order: &OrderSnapshot) -> Result<AppliedSettlement, SettlementError> {
        let split = self.policy.split(&OrderAmounts {
            subtotal_minor: order.subtotal_minor,
            delivery_fee_minor: order.delivery_fee_minor,
            tip_minor: order.tip_minor,
        })?;

        let plan = build_plan(order, &split);

        tracing::debug!(
            order_id = %order.order_id,
            credits = plan.credits.len(),
            escrow_release_minor = plan.escrow_release_minor,
            platform_fee_minor = split.platform_fee_minor,
            restaurant_revenue_minor = split.restaurant_revenue_minor,
            driver_commission_minor = split.driver_commission_minor,
            driver_payment_minor = split.driver_payment_minor,
            "Settlement plan built"
        );

        let applied = self
            .store
            .apply_settlement(&plan)
            .await
            .map_err(|e| match e {
                StoreError::AccountNotFound(id) => {
                    SettlementError::AccountResolution(format!("account {} not found", id))
                }
                other => SettlementError::Store(other),
            })?;

        Ok(applied)
    }
}

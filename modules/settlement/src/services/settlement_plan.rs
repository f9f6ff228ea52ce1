//! Settlement plan construction
//!
//! Turns a fee split into the exact set of ledger mutations one settlement
//! performs: the escrow release on the platform account and one credit per
//! paid party. The plan is pure data; the store applies it atomically.

use serde_json::json;

use crate::fee_policy::FeeSplit;
use crate::models::{AccountOwner, OrderSnapshot, TransactionKind};

/// One account credit within a settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCredit {
    pub owner: AccountOwner,
    pub kind: TransactionKind,
    pub amount_minor: i64,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// The full set of ledger mutations for settling one order
///
/// Invariants, by construction:
/// - every credit amount is positive (zero shares produce no credit, so no
///   zero-value transactions ever reach the ledger)
/// - credits are sorted by owner, giving the store a deterministic lock
///   order when several accounts are mutated in one transaction
/// - `escrow_release_minor` equals the sum of all credits, so the funds
///   leaving escrow exactly equal the funds arriving in balances
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub order_id: String,
    pub order_code: String,
    pub credits: Vec<PlannedCredit>,
    pub escrow_release_minor: i64,
}

impl SettlementPlan {
    /// Sum of all planned credits
    pub fn credited_minor(&self) -> i64 {
        self.credits.iter().map(|c| c.amount_minor).sum()
    }
}

/// Build the settlement plan for a delivered order
///
/// The platform retains its subtotal fee plus the driver commission in a
/// single `platform_fee` credit; when no driver is assigned, the would-be
/// driver payment is folded into that credit as well, so the platform
/// retains the entire non-restaurant share. The metadata keeps the
/// component breakdown auditable.
pub fn build_plan(order: &OrderSnapshot, split: &FeeSplit) -> SettlementPlan {
    let mut credits = Vec::new();

    if split.restaurant_revenue_minor > 0 {
        credits.push(PlannedCredit {
            owner: AccountOwner::restaurant(order.restaurant_id.clone()),
            kind: TransactionKind::OrderRevenue,
            amount_minor: split.restaurant_revenue_minor,
            description: format!("Order revenue for {}", order.order_code),
            metadata: json!({
                "subtotal_minor": order.subtotal_minor,
                "platform_fee_minor": split.platform_fee_minor,
            }),
        });
    }

    let mut unassigned_driver_share_minor = 0;
    match &order.driver_id {
        Some(driver_id) if split.driver_payment_minor > 0 => {
            credits.push(PlannedCredit {
                owner: AccountOwner::driver(driver_id.clone()),
                kind: TransactionKind::Commission,
                amount_minor: split.driver_payment_minor,
                description: format!("Delivery payment for {}", order.order_code),
                metadata: json!({
                    "delivery_fee_minor": order.delivery_fee_minor,
                    "tip_minor": order.tip_minor,
                    "driver_commission_minor": split.driver_commission_minor,
                }),
            });
        }
        Some(_) => {}
        None => {
            unassigned_driver_share_minor = split.driver_payment_minor;
        }
    }

    let platform_retained_minor =
        split.platform_fee_minor + split.driver_commission_minor + unassigned_driver_share_minor;

    if platform_retained_minor > 0 {
        credits.push(PlannedCredit {
            owner: AccountOwner::Platform,
            kind: TransactionKind::PlatformFee,
            amount_minor: platform_retained_minor,
            description: format!("Platform fees retained for {}", order.order_code),
            metadata: json!({
                "platform_fee_minor": split.platform_fee_minor,
                "driver_commission_minor": split.driver_commission_minor,
                "unassigned_driver_share_minor": unassigned_driver_share_minor,
            }),
        });
    }

    credits.sort_by(|a, b| a.owner.cmp(&b.owner));

    SettlementPlan {
        order_id: order.order_id.clone(),
        order_code: order.order_code.clone(),
        credits,
        escrow_release_minor: order.gross_minor(),
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// WALLET ACCOUNTS
// ============================================================================

/// Account owner category matching the database `owner_type` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "owner_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Platform,
    Restaurant,
    Driver,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Platform => "platform",
            OwnerType::Restaurant => "restaurant",
            OwnerType::Driver => "driver",
        }
    }
}

impl std::fmt::Display for OwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a wallet account's owner
///
/// There is exactly one platform account; restaurant and driver accounts are
/// keyed by the owning entity's id. The ordering is the deterministic lock
/// order used when several accounts are mutated in one settlement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccountOwner {
    Platform,
    Restaurant(String),
    Driver(String),
}

impl AccountOwner {
    pub fn restaurant(id: impl Into<String>) -> Self {
        AccountOwner::Restaurant(id.into())
    }

    pub fn driver(id: impl Into<String>) -> Self {
        AccountOwner::Driver(id.into())
    }

    pub fn owner_type(&self) -> OwnerType {
        match self {
            AccountOwner::Platform => OwnerType::Platform,
            AccountOwner::Restaurant(_) => OwnerType::Restaurant,
            AccountOwner::Driver(_) => OwnerType::Driver,
        }
    }

    pub fn owner_id(&self) -> Option<&str> {
        match self {
            AccountOwner::Platform => None,
            AccountOwner::Restaurant(id) | AccountOwner::Driver(id) => Some(id),
        }
    }
}

impl std::fmt::Display for AccountOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.owner_id() {
            Some(id) => write!(f, "{}:{}", self.owner_type(), id),
            None => f.write_str(self.owner_type().as_str()),
        }
    }
}

/// Wallet account holding available funds (and, for the platform account,
/// the escrow of collected-but-undistributed order payments)
///
/// Accounts are created lazily on first use and never deleted, only
/// deactivated. Balances are integer minor currency units; both balances
/// stay non-negative at all times.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub owner_type: OwnerType,
    pub owner_id: Option<String>,
    pub balance_minor: i64,
    pub escrow_minor: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Transaction kind matching the database `transaction_kind` enum
///
/// Amounts are always stored positive; `kind` implies the direction
/// (`withdraw` and `refund` debit the account, everything else credits it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    OrderRevenue,
    Commission,
    PlatformFee,
    Withdraw,
    Deposit,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::OrderRevenue => "order_revenue",
            TransactionKind::Commission => "commission",
            TransactionKind::PlatformFee => "platform_fee",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Deposit => "deposit",
            TransactionKind::Refund => "refund",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction status matching the database `transaction_status` enum
///
/// `pending -> completed | failed | cancelled` are the only legal
/// transitions; terminal rows are never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// Immutable ledger transaction — the audit trail of every funds movement
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount_minor: i64,
    pub status: TransactionStatus,
    pub order_id: Option<String>,
    pub order_code: Option<String>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SETTLEMENT RECORDS (idempotency markers)
// ============================================================================

/// Settlement marker status matching the database `settlement_status` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "settlement_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    InProgress,
    Completed,
    Failed,
}

/// Idempotency marker: at most one per order
///
/// A `completed` record is proof the order's funds have already moved and
/// blocks re-execution; `failed` permits a full retry; `in_progress` blocks
/// concurrent attempts.
#[derive(Debug, Clone, FromRow)]
pub struct SettlementRecord {
    pub order_id: String,
    pub status: SettlementStatus,
    pub result_transaction_ids: Vec<Uuid>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// INCOMING EVENT PAYLOADS
// ============================================================================

/// Financial snapshot of a delivered order, as carried by the
/// `orders.events.delivered` payload
///
/// All amounts are integer minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub restaurant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    pub order_code: String,
    pub subtotal_minor: i64,
    pub delivery_fee_minor: i64,
    pub tip_minor: i64,
}

impl OrderSnapshot {
    /// Everything that was collected from the customer for this order
    pub fn gross_minor(&self) -> i64 {
        self.subtotal_minor + self.delivery_fee_minor + self.tip_minor
    }
}

// ============================================================================
// OUTGOING EVENT PAYLOADS
// ============================================================================

/// Payload for wallet.events.balance.updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceUpdatedPayload {
    pub account_id: Uuid,
    pub owner_type: OwnerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub balance_minor: i64,
    pub escrow_minor: i64,
    pub order_id: String,
}

/// Payload for wallet.events.settlement.completed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementCompletedPayload {
    pub order_id: String,
    pub order_code: String,
    pub transaction_ids: Vec<Uuid>,
}

/// Payload for wallet.events.settlement.failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementFailedPayload {
    pub order_id: String,
    pub reason: String,
}

// ============================================================================
// DEAD LETTERS
// ============================================================================

/// A consumed event that could not be processed (parse failure, permanent
/// validation failure, or retries exhausted)
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event_id: Option<Uuid>,
    pub subject: String,
    pub payload: serde_json::Value,
    pub error: String,
    pub retry_count: i32,
}

//! Ledger store contract
//!
//! What the settlement engine requires from durable storage: lazy account
//! resolution, an atomic N-account + M-transaction apply primitive, the
//! unique-keyed settlement marker operations, escrow funding, the audit
//! query surface, and dead-letter capture.
//!
//! Two implementations exist, swapped by configuration exactly like the
//! event bus: [`PgLedgerStore`] (PostgreSQL, production) and
//! [`InMemoryLedgerStore`] (tests and local development).

mod memory;
mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, AccountOwner, DeadLetter, SettlementRecord, TransactionRecord};
use crate::services::settlement_plan::SettlementPlan;

/// Errors from ledger store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("insufficient escrow: need {needed_minor}, held {held_minor}")]
    InsufficientEscrow { needed_minor: i64, held_minor: i64 },

    #[error("account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("no settlement record for order {0}")]
    SettlementNotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Verdict of `begin_settlement` — the idempotency gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementGate {
    /// No live marker existed; this caller owns the settlement attempt
    Started,
    /// A `completed` marker exists; funds already moved, caller must no-op
    AlreadySettled,
    /// An `in_progress` marker exists; another attempt is running and the
    /// caller must back off rather than proceed
    InProgressConflict,
}

/// Result of funding the platform escrow for an order
#[derive(Debug, Clone)]
pub enum FundingOutcome {
    /// Escrow credited; the deposit transaction is returned
    Funded(TransactionRecord),
    /// A deposit for this order already exists; no funds moved
    AlreadyFunded,
    /// Zero-value order; nothing to hold in escrow
    NothingDue,
}

/// Result of atomically applying a settlement plan
#[derive(Debug, Clone)]
pub struct AppliedSettlement {
    /// The completed transactions created by this settlement, in plan order
    pub transactions: Vec<TransactionRecord>,
    /// Post-apply snapshots of every account the settlement touched
    pub accounts: Vec<Account>,
}

impl AppliedSettlement {
    pub fn transaction_ids(&self) -> Vec<Uuid> {
        self.transactions.iter().map(|t| t.id).collect()
    }
}

/// Durable storage contract for the wallet ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Get or lazily create the account for an owner
    ///
    /// Creation is concurrency-safe: two racing callers observe the same
    /// account.
    async fn resolve_account(&self, owner: &AccountOwner) -> Result<Account, StoreError>;

    /// Look up an account without creating it
    async fn find_account(&self, owner: &AccountOwner) -> Result<Option<Account>, StoreError>;

    /// Mark an account inactive; accounts are never deleted
    async fn deactivate_account(&self, id: Uuid) -> Result<(), StoreError>;

    /// Credit the platform escrow with an order's collected payment and
    /// append the `deposit` transaction
    ///
    /// Idempotent per order: a second call observes the existing deposit
    /// and moves no funds. `amount_minor` must be positive.
    async fn fund_escrow(
        &self,
        order_id: &str,
        order_code: &str,
        amount_minor: i64,
    ) -> Result<FundingOutcome, StoreError>;

    /// Claim the settlement marker for an order (unique insert semantics)
    ///
    /// A `failed` marker is atomically flipped back to `in_progress` so the
    /// order can be re-driven from scratch; exactly one of any concurrent
    /// callers wins `Started`.
    async fn begin_settlement(&self, order_id: &str) -> Result<SettlementGate, StoreError>;

    /// Apply a settlement plan as one all-or-nothing unit
    ///
    /// Lazily resolves every credited account plus the platform account,
    /// verifies the platform escrow covers the release amount, credits each
    /// account, debits the escrow, and appends one `completed` transaction
    /// per credit. On any failure nothing is applied.
    async fn apply_settlement(&self, plan: &SettlementPlan)
        -> Result<AppliedSettlement, StoreError>;

    /// Transition the marker `in_progress -> completed`, stamping
    /// `completed_at` and the resulting transaction ids
    async fn complete_settlement(
        &self,
        order_id: &str,
        transaction_ids: &[Uuid],
    ) -> Result<(), StoreError>;

    /// Transition the marker `in_progress -> failed`, retaining the reason;
    /// a failed order is eligible for a full retry
    async fn fail_settlement(&self, order_id: &str, reason: &str) -> Result<(), StoreError>;

    /// Fetch the settlement marker for an order, if any
    async fn settlement_record(&self, order_id: &str)
        -> Result<Option<SettlementRecord>, StoreError>;

    /// Audit query: all transactions referencing an order
    async fn transactions_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Audit query: all transactions on an account, newest first
    async fn transactions_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Record an event the consumer gave up on
    async fn record_dead_letter(&self, letter: DeadLetter) -> Result<(), StoreError>;
}

impl std::fmt::Debug for dyn LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerStore")
    }
}

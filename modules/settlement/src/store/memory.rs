//! In-memory implementation of the LedgerStore trait for testing and
//! development
//!
//! All state lives behind one mutex, so every operation is naturally
//! atomic: `apply_settlement` validates the escrow before mutating
//! anything, which gives the same all-or-nothing behavior a database
//! transaction provides.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    Account, AccountOwner, DeadLetter, SettlementRecord, SettlementStatus, TransactionKind,
    TransactionRecord, TransactionStatus,
};
use crate::services::settlement_plan::SettlementPlan;
use crate::store::{
    AppliedSettlement, FundingOutcome, LedgerStore, SettlementGate, StoreError,
};

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Uuid, Account>,
    owner_index: HashMap<AccountOwner, Uuid>,
    transactions: Vec<TransactionRecord>,
    settlements: HashMap<String, SettlementRecord>,
    dead_letters: Vec<DeadLetter>,
}

impl LedgerState {
    fn resolve_account(&mut self, owner: &AccountOwner) -> Uuid {
        if let Some(id) = self.owner_index.get(owner) {
            return *id;
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            owner_type: owner.owner_type(),
            owner_id: owner.owner_id().map(|s| s.to_string()),
            balance_minor: 0,
            escrow_minor: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let id = account.id;
        self.owner_index.insert(owner.clone(), id);
        self.accounts.insert(id, account);
        id
    }

    fn push_transaction(
        &mut self,
        account_id: Uuid,
        kind: TransactionKind,
        amount_minor: i64,
        order_id: Option<&str>,
        order_code: Option<&str>,
        description: String,
        metadata: serde_json::Value,
    ) -> TransactionRecord {
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount_minor,
            status: TransactionStatus::Completed,
            order_id: order_id.map(|s| s.to_string()),
            order_code: order_code.map(|s| s.to_string()),
            description,
            metadata,
            created_at: Utc::now(),
        };
        self.transactions.push(record.clone());
        record
    }
}

/// LedgerStore implementation backed by in-process maps
///
/// Cloning shares the underlying state, mirroring how a connection pool is
/// cloned.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test accessor: every recorded dead letter
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().expect("ledger state poisoned").dead_letters.clone()
    }

    /// Test accessor: every transaction in insertion order
    pub fn all_transactions(&self) -> Vec<TransactionRecord> {
        self.state.lock().expect("ledger state poisoned").transactions.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("ledger state poisoned")
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn resolve_account(&self, owner: &AccountOwner) -> Result<Account, StoreError> {
        let mut state = self.lock();
        let id = state.resolve_account(owner);
        Ok(state.accounts[&id].clone())
    }

    async fn find_account(&self, owner: &AccountOwner) -> Result<Option<Account>, StoreError> {
        let state = self.lock();
        Ok(state
            .owner_index
            .get(owner)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn deactivate_account(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound(id))?;
        account.is_active = false;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn fund_escrow(
        &self,
        order_id: &str,
        order_code: &str,
        amount_minor: i64,
    ) -> Result<FundingOutcome, StoreError> {
        if amount_minor <= 0 {
            return Err(StoreError::InvalidState(format!(
                "escrow funding amount must be positive, got {}",
                amount_minor
            )));
        }

        let mut state = self.lock();

        let already_funded = state.transactions.iter().any(|t| {
            t.kind == TransactionKind::Deposit && t.order_id.as_deref() == Some(order_id)
        });
        if already_funded {
            return Ok(FundingOutcome::AlreadyFunded);
        }

        let platform_id = state.resolve_account(&AccountOwner::Platform);
        {
            let platform = state
                .accounts
                .get_mut(&platform_id)
                .ok_or(StoreError::AccountNotFound(platform_id))?;
            platform.escrow_minor += amount_minor;
            platform.updated_at = Utc::now();
        }

        let record = state.push_transaction(
            platform_id,
            TransactionKind::Deposit,
            amount_minor,
            Some(order_id),
            Some(order_code),
            format!("Escrow funding for {}", order_code),
            serde_json::json!({}),
        );

        Ok(FundingOutcome::Funded(record))
    }

    async fn begin_settlement(&self, order_id: &str) -> Result<SettlementGate, StoreError> {
        let mut state = self.lock();

        match state.settlements.get_mut(order_id) {
            None => {
                state.settlements.insert(
                    order_id.to_string(),
                    SettlementRecord {
                        order_id: order_id.to_string(),
                        status: SettlementStatus::InProgress,
                        result_transaction_ids: Vec::new(),
                        failure_reason: None,
                        created_at: Utc::now(),
                        completed_at: None,
                    },
                );
                Ok(SettlementGate::Started)
            }
            Some(record) => match record.status {
                SettlementStatus::Completed => Ok(SettlementGate::AlreadySettled),
                SettlementStatus::InProgress => Ok(SettlementGate::InProgressConflict),
                SettlementStatus::Failed => {
                    record.status = SettlementStatus::InProgress;
                    record.failure_reason = None;
                    record.result_transaction_ids = Vec::new();
                    record.completed_at = None;
                    Ok(SettlementGate::Started)
                }
            },
        }
    }

    async fn apply_settlement(
        &self,
        plan: &SettlementPlan,
    ) -> Result<AppliedSettlement, StoreError> {
        let mut state = self.lock();

        let platform_id = state.resolve_account(&AccountOwner::Platform);
        let held_minor = state.accounts[&platform_id].escrow_minor;
        if held_minor < plan.escrow_release_minor {
            return Err(StoreError::InsufficientEscrow {
                needed_minor: plan.escrow_release_minor,
                held_minor,
            });
        }

        // Past this point nothing can fail, so the mutations below are
        // observed all-or-nothing.
        let mut touched: Vec<Uuid> = vec![platform_id];
        let mut transactions = Vec::with_capacity(plan.credits.len());

        for credit in &plan.credits {
            let account_id = state.resolve_account(&credit.owner);
            if !touched.contains(&account_id) {
                touched.push(account_id);
            }

            let account = state
                .accounts
                .get_mut(&account_id)
                .ok_or(StoreError::AccountNotFound(account_id))?;
            account.balance_minor += credit.amount_minor;
            account.updated_at = Utc::now();

            let record = state.push_transaction(
                account_id,
                credit.kind,
                credit.amount_minor,
                Some(&plan.order_id),
                Some(&plan.order_code),
                credit.description.clone(),
                credit.metadata.clone(),
            );
            transactions.push(record);
        }

        {
            let platform = state
                .accounts
                .get_mut(&platform_id)
                .ok_or(StoreError::AccountNotFound(platform_id))?;
            platform.escrow_minor -= plan.escrow_release_minor;
            platform.updated_at = Utc::now();
        }

        let accounts = touched
            .iter()
            .map(|id| state.accounts[id].clone())
            .collect();

        Ok(AppliedSettlement {
            transactions,
            accounts,
        })
    }

    async fn complete_settlement(
        &self,
        order_id: &str,
        transaction_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state
            .settlements
            .get_mut(order_id)
            .ok_or_else(|| StoreError::SettlementNotFound(order_id.to_string()))?;

        if record.status != SettlementStatus::InProgress {
            return Err(StoreError::InvalidState(format!(
                "cannot complete settlement for order {} from status {:?}",
                order_id, record.status
            )));
        }

        record.status = SettlementStatus::Completed;
        record.result_transaction_ids = transaction_ids.to_vec();
        record.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail_settlement(&self, order_id: &str, reason: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state
            .settlements
            .get_mut(order_id)
            .ok_or_else(|| StoreError::SettlementNotFound(order_id.to_string()))?;

        if record.status != SettlementStatus::InProgress {
            return Err(StoreError::InvalidState(format!(
                "cannot fail settlement for order {} from status {:?}",
                order_id, record.status
            )));
        }

        record.status = SettlementStatus::Failed;
        record.failure_reason = Some(reason.to_string());
        Ok(())
    }

    async fn settlement_record(
        &self,
        order_id: &str,
    ) -> Result<Option<SettlementRecord>, StoreError> {
        Ok(self.lock().settlements.get(order_id).cloned())
    }

    async fn transactions_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.order_id.as_deref() == Some(order_id))
            .cloned()
            .collect())
    }

    async fn transactions_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut records: Vec<TransactionRecord> = self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        records.reverse(); // newest first, matching the SQL ordering
        Ok(records)
    }

    async fn record_dead_letter(&self, letter: DeadLetter) -> Result<(), StoreError> {
        self.lock().dead_letters.push(letter);
        Ok(())
    }
}

//! PostgreSQL implementation of the LedgerStore trait
//!
//! Composes the repo functions inside native database transactions: the
//! settlement apply is one transaction over all touched accounts (locked
//! `FOR UPDATE` in the plan's deterministic owner order), and the
//! idempotency gate rides on the `settlement_records` primary key.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    Account, AccountOwner, DeadLetter, SettlementRecord, SettlementStatus, TransactionKind,
    TransactionStatus,
};
use crate::repos::{account_repo, failed_repo, settlement_repo, transaction_repo};
use crate::services::settlement_plan::SettlementPlan;
use crate::store::{
    AppliedSettlement, FundingOutcome, LedgerStore, SettlementGate, StoreError,
};

/// Production ledger store over a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn gate_from_status(status: SettlementStatus) -> SettlementGate {
        match status {
            SettlementStatus::Completed => SettlementGate::AlreadySettled,
            SettlementStatus::InProgress => SettlementGate::InProgressConflict,
            // A failed marker seen here means another caller won the retry
            // CAS and is now in progress.
            SettlementStatus::Failed => SettlementGate::InProgressConflict,
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn resolve_account(&self, owner: &AccountOwner) -> Result<Account, StoreError> {
        Ok(account_repo::resolve(&self.pool, owner).await?)
    }

    async fn find_account(&self, owner: &AccountOwner) -> Result<Option<Account>, StoreError> {
        Ok(account_repo::find_by_owner(&self.pool, owner).await?)
    }

    async fn deactivate_account(&self, id: Uuid) -> Result<(), StoreError> {
        let rows = account_repo::deactivate(&self.pool, id).await?;
        if rows == 0 {
            return Err(StoreError::AccountNotFound(id));
        }
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

        let mut tx = self.pool.begin().await?;

        if transaction_repo::order_deposit_exists_tx(&mut tx, order_id).await? {
            return Ok(FundingOutcome::AlreadyFunded);
        }

        let platform = account_repo::resolve_for_update_tx(&mut tx, &AccountOwner::Platform).await?;
        account_repo::credit_escrow_tx(&mut tx, platform.id, amount_minor).await?;

        let insert_result = transaction_repo::insert_tx(
            &mut tx,
            platform.id,
            TransactionKind::Deposit,
            amount_minor,
            TransactionStatus::Completed,
            Some(order_id),
            Some(order_code),
            &format!("Escrow funding for {}", order_code),
            &serde_json::json!({}),
        )
        .await;

        let record = match insert_result {
            Ok(record) => record,
            // The partial unique index on (order_id) for deposits closes
            // the check-then-insert race: the loser rolls back and reports
            // the order as already funded.
            Err(sqlx::Error::Database(db_err))
                if matches!(db_err.kind(), ErrorKind::UniqueViolation) =>
            {
                tx.rollback().await?;
                return Ok(FundingOutcome::AlreadyFunded);
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        Ok(FundingOutcome::Funded(record))
    }

    async fn begin_settlement(&self, order_id: &str) -> Result<SettlementGate, StoreError> {
        if settlement_repo::try_insert_in_progress(&self.pool, order_id).await? {
            return Ok(SettlementGate::Started);
        }

        let record = settlement_repo::find(&self.pool, order_id)
            .await?
            .ok_or_else(|| {
                // Marker rows are never deleted, so a conflicting insert
                // followed by an empty read should not happen.
                StoreError::InvalidState(format!(
                    "settlement marker for order {} vanished between insert and read",
                    order_id
                ))
            })?;

        match record.status {
            SettlementStatus::Completed => Ok(SettlementGate::AlreadySettled),
            SettlementStatus::InProgress => Ok(SettlementGate::InProgressConflict),
            SettlementStatus::Failed => {
                if settlement_repo::retry_failed(&self.pool, order_id).await? {
                    return Ok(SettlementGate::Started);
                }
                // Lost the retry CAS; report whatever the winner left behind.
                let record = settlement_repo::find(&self.pool, order_id)
                    .await?
                    .ok_or_else(|| StoreError::SettlementNotFound(order_id.to_string()))?;
                Ok(Self::gate_from_status(record.status))
            }
        }
    }

    async fn apply_settlement(
        &self,
        plan: &SettlementPlan,
    ) -> Result<AppliedSettlement, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The platform row is always locked first; plan credits are sorted
        // by owner, so concurrent settlements acquire locks in the same
        // order.
        let platform = account_repo::resolve_for_update_tx(&mut tx, &AccountOwner::Platform).await?;
        if platform.escrow_minor < plan.escrow_release_minor {
            return Err(StoreError::InsufficientEscrow {
                needed_minor: plan.escrow_release_minor,
                held_minor: platform.escrow_minor,
            });
        }

        let mut touched_order: Vec<Uuid> = vec![platform.id];
        let mut latest: HashMap<Uuid, Account> = HashMap::from([(platform.id, platform.clone())]);
        let mut transactions = Vec::with_capacity(plan.credits.len());

        for credit in &plan.credits {
            let account = if credit.owner == AccountOwner::Platform {
                platform.clone()
            } else {
                account_repo::resolve_for_update_tx(&mut tx, &credit.owner).await?
            };

            if !touched_order.contains(&account.id) {
                touched_order.push(account.id);
            }

            let updated =
                account_repo::credit_balance_tx(&mut tx, account.id, credit.amount_minor).await?;
            latest.insert(updated.id, updated);

            let record = transaction_repo::insert_tx(
                &mut tx,
                account.id,
                credit.kind,
                credit.amount_minor,
                TransactionStatus::Completed,
                Some(&plan.order_id),
                Some(&plan.order_code),
                &credit.description,
                &credit.metadata,
            )
            .await?;
            transactions.push(record);
        }

        if plan.escrow_release_minor > 0 {
            let updated =
                account_repo::release_escrow_tx(&mut tx, platform.id, plan.escrow_release_minor)
                    .await?;
            latest.insert(updated.id, updated);
        }

        tx.commit().await?;

        let accounts = touched_order
            .into_iter()
            .filter_map(|id| latest.remove(&id))
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
        let rows = settlement_repo::mark_completed(&self.pool, order_id, transaction_ids).await?;
        if rows == 1 {
            return Ok(());
        }

        match settlement_repo::find(&self.pool, order_id).await? {
            None => Err(StoreError::SettlementNotFound(order_id.to_string())),
            Some(record) => Err(StoreError::InvalidState(format!(
                "cannot complete settlement for order {} from status {:?}",
                order_id, record.status
            ))),
        }
    }

    async fn fail_settlement(&self, order_id: &str, reason: &str) -> Result<(), StoreError> {
        let rows = settlement_repo::mark_failed(&self.pool, order_id, reason).await?;
        if rows == 1 {
            return Ok(());
        }

        match settlement_repo::find(&self.pool, order_id).await? {
            None => Err(StoreError::SettlementNotFound(order_id.to_string())),
            Some(record) => Err(StoreError::InvalidState(format!(
                "cannot fail settlement for order {} from status {:?}",
                order_id, record.status
            ))),
        }
    }

    async fn settlement_record(
        &self,
        order_id: &str,
    ) -> Result<Option<SettlementRecord>, StoreError> {
        Ok(settlement_repo::find(&self.pool, order_id).await?)
    }

    async fn transactions_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<crate::models::TransactionRecord>, StoreError> {
        Ok(transaction_repo::find_for_order(&self.pool, order_id).await?)
    }

    async fn transactions_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<crate::models::TransactionRecord>, StoreError> {
        Ok(transaction_repo::find_for_account(&self.pool, account_id).await?)
    }

    async fn record_dead_letter(&self, letter: DeadLetter) -> Result<(), StoreError> {
        Ok(failed_repo::insert(&self.pool, &letter).await?)
    }
}

//! Repository for the append-only wallet transaction ledger
//!
//! Rows are only ever inserted; the `amount_minor > 0` CHECK keeps
//! zero-value noise out of the audit trail at the schema level too.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{TransactionKind, TransactionRecord, TransactionStatus};

const TRANSACTION_COLUMNS: &str = r#"
    id,
    account_id,
    kind,
    amount_minor,
    status,
    order_id,
    order_code,
    description,
    metadata,
    created_at
"#;

/// Append a transaction within a transaction, returning the created row
pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    kind: TransactionKind,
    amount_minor: i64,
    status: TransactionStatus,
    order_id: Option<&str>,
    order_code: Option<&str>,
    description: &str,
    metadata: &serde_json::Value,
) -> Result<TransactionRecord, sqlx::Error> {
    sqlx::query_as::<_, TransactionRecord>(&format!(
        r#"
        INSERT INTO wallet_transactions (
            account_id,
            kind,
            amount_minor,
            status,
            order_id,
            order_code,
            description,
            metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {TRANSACTION_COLUMNS}
        "#,
    ))
    .bind(account_id)
    .bind(kind)
    .bind(amount_minor)
    .bind(status)
    .bind(order_id)
    .bind(order_code)
    .bind(description)
    .bind(metadata)
    .fetch_one(&mut **tx)
    .await
}

/// Whether an escrow deposit already exists for an order (funding
/// idempotency check)
pub async fn order_deposit_exists_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM wallet_transactions
            WHERE order_id = $1 AND kind = 'deposit'
        )
        "#,
    )
    .bind(order_id)
    .fetch_one(&mut **tx)
    .await
}

/// All transactions referencing an order, oldest first
pub async fn find_for_order(
    pool: &PgPool,
    order_id: &str,
) -> Result<Vec<TransactionRecord>, sqlx::Error> {
    sqlx::query_as::<_, TransactionRecord>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM wallet_transactions
        WHERE order_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await
}

/// All transactions on an account, newest first
pub async fn find_for_account(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Vec<TransactionRecord>, sqlx::Error> {
    sqlx::query_as::<_, TransactionRecord>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM wallet_transactions
        WHERE account_id = $1
        ORDER BY created_at DESC, id DESC
        "#,
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await
}

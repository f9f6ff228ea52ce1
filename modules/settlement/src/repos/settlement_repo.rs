//! Repository for settlement markers (idempotency records)
//!
//! The `order_id` primary key is the at-most-once guarantee for the whole
//! subsystem: claiming a marker is a unique insert, and the failed->retry
//! transition is a status-guarded compare-and-swap.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::SettlementRecord;

const SETTLEMENT_COLUMNS: &str = r#"
    order_id,
    status,
    result_transaction_ids,
    failure_reason,
    created_at,
    completed_at
"#;

/// Try to claim a fresh marker for an order
///
/// Returns true when this caller inserted the `in_progress` row; false when
/// a marker already exists (in any status).
pub async fn try_insert_in_progress(pool: &PgPool, order_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO settlement_records (order_id, status)
        VALUES ($1, 'in_progress')
        ON CONFLICT (order_id) DO NOTHING
        "#,
    )
    .bind(order_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Compare-and-swap a `failed` marker back to `in_progress` for a retry
///
/// Returns true when this caller won the transition; false when the marker
/// is no longer `failed` (another attempt got there first).
pub async fn retry_failed(pool: &PgPool, order_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE settlement_records
        SET status = 'in_progress',
            failure_reason = NULL,
            result_transaction_ids = '{}',
            completed_at = NULL
        WHERE order_id = $1 AND status = 'failed'
        "#,
    )
    .bind(order_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Transition `in_progress -> completed`, stamping the result
///
/// Returns the number of rows affected; zero means the marker was missing
/// or not `in_progress`.
pub async fn mark_completed(
    pool: &PgPool,
    order_id: &str,
    transaction_ids: &[Uuid],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE settlement_records
        SET status = 'completed',
            result_transaction_ids = $2,
            completed_at = NOW()
        WHERE order_id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(order_id)
    .bind(transaction_ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Transition `in_progress -> failed`, retaining the reason
pub async fn mark_failed(pool: &PgPool, order_id: &str, reason: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE settlement_records
        SET status = 'failed',
            failure_reason = $2
        WHERE order_id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(order_id)
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fetch the marker for an order, if any
pub async fn find(pool: &PgPool, order_id: &str) -> Result<Option<SettlementRecord>, sqlx::Error> {
    sqlx::query_as::<_, SettlementRecord>(&format!(
        r#"
        SELECT {SETTLEMENT_COLUMNS}
        FROM settlement_records
        WHERE order_id = $1
        "#,
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await
}

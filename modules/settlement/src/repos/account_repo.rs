//! Repository for wallet account operations
//!
//! Accounts are created lazily on first use (`INSERT .. ON CONFLICT DO
//! NOTHING` against the owner unique index) and mutated only inside
//! settlement/funding transactions, where rows are taken `FOR UPDATE` in
//! deterministic owner order.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Account, AccountOwner};

const ACCOUNT_COLUMNS: &str = r#"
    id,
    owner_type,
    owner_id,
    balance_minor,
    escrow_minor,
    is_active,
    created_at,
    updated_at
"#;

/// Find an account by owner, without creating it
pub async fn find_by_owner(
    pool: &PgPool,
    owner: &AccountOwner,
) -> Result<Option<Account>, sqlx::Error> {
    let account = sqlx::query_as::<_, Account>(&format!(
        r#"
        SELECT {ACCOUNT_COLUMNS}
        FROM wallet_accounts
        WHERE owner_type = $1
          AND COALESCE(owner_id, '') = COALESCE($2, '')
        "#,
    ))
    .bind(owner.owner_type())
    .bind(owner.owner_id())
    .fetch_optional(pool)
    .await?;

    Ok(account)
}

/// Get or lazily create the account for an owner
///
/// Safe under concurrency: the insert is `ON CONFLICT DO NOTHING`, so two
/// racing callers both land on the same row.
pub async fn resolve(pool: &PgPool, owner: &AccountOwner) -> Result<Account, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO wallet_accounts (owner_type, owner_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(owner.owner_type())
    .bind(owner.owner_id())
    .execute(pool)
    .await?;

    sqlx::query_as::<_, Account>(&format!(
        r#"
        SELECT {ACCOUNT_COLUMNS}
        FROM wallet_accounts
        WHERE owner_type = $1
          AND COALESCE(owner_id, '') = COALESCE($2, '')
        "#,
    ))
    .bind(owner.owner_type())
    .bind(owner.owner_id())
    .fetch_one(pool)
    .await
}

/// Get or lazily create an account within a transaction, locking the row
/// for the remainder of the transaction
pub async fn resolve_for_update_tx(
    tx: &mut Transaction<'_, Postgres>,
    owner: &AccountOwner,
) -> Result<Account, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO wallet_accounts (owner_type, owner_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(owner.owner_type())
    .bind(owner.owner_id())
    .execute(&mut **tx)
    .await?;

    sqlx::query_as::<_, Account>(&format!(
        r#"
        SELECT {ACCOUNT_COLUMNS}
        FROM wallet_accounts
        WHERE owner_type = $1
          AND COALESCE(owner_id, '') = COALESCE($2, '')
        FOR UPDATE
        "#,
    ))
    .bind(owner.owner_type())
    .bind(owner.owner_id())
    .fetch_one(&mut **tx)
    .await
}

/// Credit an account's available balance, returning the updated row
pub async fn credit_balance_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    amount_minor: i64,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(&format!(
        r#"
        UPDATE wallet_accounts
        SET balance_minor = balance_minor + $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ACCOUNT_COLUMNS}
        "#,
    ))
    .bind(account_id)
    .bind(amount_minor)
    .fetch_one(&mut **tx)
    .await
}

/// Credit the escrow balance (order payment collected), returning the
/// updated row
pub async fn credit_escrow_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    amount_minor: i64,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(&format!(
        r#"
        UPDATE wallet_accounts
        SET escrow_minor = escrow_minor + $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ACCOUNT_COLUMNS}
        "#,
    ))
    .bind(account_id)
    .bind(amount_minor)
    .fetch_one(&mut **tx)
    .await
}

/// Debit the escrow balance (settlement release), returning the updated row
///
/// The `escrow_minor >= 0` CHECK constraint backstops the caller's own
/// sufficiency check.
pub async fn release_escrow_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    amount_minor: i64,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(&format!(
        r#"
        UPDATE wallet_accounts
        SET escrow_minor = escrow_minor - $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ACCOUNT_COLUMNS}
        "#,
    ))
    .bind(account_id)
    .bind(amount_minor)
    .fetch_one(&mut **tx)
    .await
}

/// Mark an account inactive; returns the number of rows affected
pub async fn deactivate(pool: &PgPool, account_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE wallet_accounts
        SET is_active = FALSE,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

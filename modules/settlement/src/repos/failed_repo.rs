//! Repository for dead-lettered events

use sqlx::PgPool;

use crate::models::DeadLetter;

/// Record an event the consumer gave up on
pub async fn insert(pool: &PgPool, letter: &DeadLetter) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO settlement_dead_letters (event_id, subject, payload, error, retry_count)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(letter.event_id)
    .bind(&letter.subject)
    .bind(&letter.payload)
    .bind(&letter.error)
    .bind(letter.retry_count)
    .execute(pool)
    .await?;

    Ok(())
}

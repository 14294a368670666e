use sqlx::PgPool;

use crate::{Result, models::OutboxRow};

/// Claim a batch of due outbox rows by marking them `sending` so a second
/// relay instance polling concurrently won't pick them up too.
pub async fn claim_batch(pool: &PgPool, batch_size: i64) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query_as::<_, OutboxRow>(
        "UPDATE message_outbox SET status = 'sending' \
         WHERE id IN ( \
             SELECT id FROM message_outbox \
             WHERE status = 'pending' AND next_retry_time <= now() \
             ORDER BY id LIMIT $1 FOR UPDATE SKIP LOCKED \
         ) RETURNING *",
    )
    .bind(batch_size)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn mark_sent(pool: &PgPool, id: i64) -> Result<()> {
    sqlx::query("UPDATE message_outbox SET status = 'sent' WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a just-inserted row sent by `msg_id` rather than surrogate id, for
/// the ingestion-time best-effort publish attempt (§4.3 step 5) — the
/// caller doesn't have the outbox row's `id` at that point, only `msg_id`.
/// A no-op if the relay already claimed the row first.
pub async fn mark_sent_by_msg_id(pool: &PgPool, msg_id: &str) -> Result<()> {
    sqlx::query("UPDATE message_outbox SET status = 'sent' WHERE msg_id = $1 AND status = 'pending'")
        .bind(msg_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a failed publish attempt with quadratic backoff. Once
/// `retry_count` reaches `max_retries` the row is marked permanently
/// `failed` instead of rescheduled.
pub async fn mark_retry(pool: &PgPool, id: i64, max_retries: i32) -> Result<()> {
    sqlx::query(
        "UPDATE message_outbox SET \
             retry_count = retry_count + 1, \
             status = CASE WHEN retry_count + 1 >= $2 THEN 'failed' ELSE 'pending' END, \
             next_retry_time = now() + (power(retry_count + 1, 2) * interval '1 second') \
         WHERE id = $1",
    )
    .bind(id)
    .bind(max_retries)
    .execute(pool)
    .await?;
    Ok(())
}

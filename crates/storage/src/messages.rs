use sqlx::PgPool;

use crate::{Error, Result, models::MessageContent};

/// Persist an incoming chat message: insert the content row, CAS-bump the
/// session's `max_seq_id`, and enqueue an outbox row for fan-out — all in
/// one transaction so a crash between steps never leaves a gap.
///
/// `seq_id` must already be reserved (via the KV sequencer) before calling
/// this; the CAS update here only guards against it ever being replayed
/// out of order into the same session.
pub async fn ingest(
    pool: &PgPool,
    msg_id: &str,
    session_id: &str,
    sender_username: &str,
    seq_id: i64,
    content: &str,
    msg_type: &str,
    outbox_topic: &str,
    outbox_payload: &serde_json::Value,
) -> Result<MessageContent> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, MessageContent>(
        "INSERT INTO messages (msg_id, session_id, sender_username, seq_id, content, msg_type) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(msg_id)
    .bind(session_id)
    .bind(sender_username)
    .bind(seq_id)
    .bind(content)
    .bind(msg_type)
    .fetch_one(&mut *tx)
    .await?;

    let updated = sqlx::query(
        "UPDATE sessions SET max_seq_id = $1 WHERE session_id = $2 AND max_seq_id < $1",
    )
    .bind(seq_id)
    .bind(session_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() != 1 {
        return Err(Error::SeqCasConflict(session_id.to_string()));
    }

    sqlx::query(
        "INSERT INTO message_outbox (msg_id, topic, payload, status, next_retry_time) \
         VALUES ($1, $2, $3, 'pending', now())",
    )
    .bind(msg_id)
    .bind(outbox_topic)
    .bind(outbox_payload)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

pub async fn history(
    pool: &PgPool,
    session_id: &str,
    before_seq_id: i64,
    limit: i64,
) -> Result<Vec<MessageContent>> {
    let rows = sqlx::query_as::<_, MessageContent>(
        "SELECT * FROM messages WHERE session_id = $1 AND seq_id < $2 \
         ORDER BY seq_id DESC LIMIT $3",
    )
    .bind(session_id)
    .bind(before_seq_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

use sqlx::PgPool;

use crate::{Result, models::InboxDeltaEvent};

/// Fan a delivered message out into every session member's inbox,
/// including the sender's own — so a sender's other devices see the
/// message through the same delta-sync path as everyone else.
pub async fn fan_out(
    pool: &PgPool,
    session_id: &str,
    msg_id: &str,
    seq_id: i64,
    recipients: &[String],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for owner in recipients {
        sqlx::query(
            "INSERT INTO inbox (owner_username, session_id, seq_id, msg_id) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (owner_username, session_id, seq_id) DO NOTHING",
        )
        .bind(owner)
        .bind(session_id)
        .bind(seq_id)
        .bind(msg_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Pull the next page of a user's inbox strictly after `after_id`, ordered
/// by the inbox row's own `id` so delivery order matches insertion order
/// regardless of which session a message belongs to.
pub async fn pull_delta(
    pool: &PgPool,
    owner_username: &str,
    after_id: i64,
    limit: i64,
) -> Result<(Vec<InboxDeltaEvent>, bool)> {
    let rows = sqlx::query_as::<_, InboxDeltaRow>(
        "SELECT i.id, i.session_id, s.name AS session_name, i.msg_id, i.seq_id, \
                m.sender_username, m.content, m.msg_type, m.created_at, i.is_read \
         FROM inbox i \
         JOIN messages m ON m.msg_id = i.msg_id \
         JOIN sessions s ON s.session_id = i.session_id \
         WHERE i.owner_username = $1 AND i.id > $2 \
         ORDER BY i.id ASC LIMIT $3",
    )
    .bind(owner_username)
    .bind(after_id)
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let has_more = rows.len() as i64 > limit;
    let events = rows
        .into_iter()
        .take(limit as usize)
        .map(InboxDeltaRow::into_event)
        .collect();
    Ok((events, has_more))
}

pub async fn mark_read(pool: &PgPool, owner_username: &str, session_id: &str, seq_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE inbox SET is_read = true \
         WHERE owner_username = $1 AND session_id = $2 AND seq_id <= $3",
    )
    .bind(owner_username)
    .bind(session_id)
    .bind(seq_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct InboxDeltaRow {
    id: i64,
    session_id: String,
    session_name: String,
    msg_id: String,
    seq_id: i64,
    sender_username: String,
    content: String,
    msg_type: String,
    created_at: chrono::DateTime<chrono::Utc>,
    is_read: bool,
}

impl InboxDeltaRow {
    fn into_event(self) -> InboxDeltaEvent {
        InboxDeltaEvent {
            id: self.id,
            session_id: self.session_id,
            session_name: self.session_name,
            msg_id: self.msg_id,
            seq_id: self.seq_id,
            sender_username: self.sender_username,
            content: self.content,
            msg_type: self.msg_type,
            created_at: self.created_at,
            is_read: self.is_read,
        }
    }
}

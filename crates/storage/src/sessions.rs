use sqlx::PgPool;

use crate::{
    Result,
    models::{MemberRole, Session, SessionMember, SessionType},
};

/// Direct-chat session ids are deterministic: the two usernames sorted and
/// joined, so both participants compute the same id without a lookup.
#[must_use]
pub fn direct_session_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("dm:{a}:{b}")
    } else {
        format!("dm:{b}:{a}")
    }
}

pub async fn create_direct(pool: &PgPool, a: &str, b: &str) -> Result<Session> {
    let session_id = direct_session_id(a, b);
    create(pool, &session_id, SessionType::Direct, "", a, &[a, b]).await
}

pub async fn create_group(
    pool: &PgPool,
    session_id: &str,
    name: &str,
    owner: &str,
    members: &[&str],
) -> Result<Session> {
    create(pool, session_id, SessionType::Group, name, owner, members).await
}

async fn create(
    pool: &PgPool,
    session_id: &str,
    session_type: SessionType,
    name: &str,
    owner: &str,
    members: &[&str],
) -> Result<Session> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO sessions (session_id, session_type, name, owner_username) \
         VALUES ($1, $2, $3, $4) ON CONFLICT (session_id) DO NOTHING",
    )
    .bind(session_id)
    .bind(session_type as i16)
    .bind(name)
    .bind(owner)
    .execute(&mut *tx)
    .await?;

    for member in members {
        sqlx::query(
            "INSERT INTO session_members (session_id, username, role) VALUES ($1, $2, $3) \
             ON CONFLICT (session_id, username) DO NOTHING",
        )
        .bind(session_id)
        .bind(member)
        .bind(if *member == owner { MemberRole::Admin as i16 } else { MemberRole::Member as i16 })
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(Session {
        session_id: session_id.to_string(),
        session_type: session_type as i16,
        name: name.to_string(),
        owner_username: owner.to_string(),
        max_seq_id: 0,
    })
}

pub async fn get(pool: &PgPool, session_id: &str) -> Result<Option<Session>> {
    let row = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_id = $1")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn is_member(pool: &PgPool, session_id: &str, username: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM session_members WHERE session_id = $1 AND username = $2",
    )
    .bind(session_id)
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn members(pool: &PgPool, session_id: &str) -> Result<Vec<SessionMember>> {
    let rows = sqlx::query_as::<_, SessionMember>(
        "SELECT * FROM session_members WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn members_excluding(pool: &PgPool, session_id: &str, exclude: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT username FROM session_members WHERE session_id = $1 AND username != $2",
    )
    .bind(session_id)
    .bind(exclude)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(u,)| u).collect())
}

/// Sessions the user belongs to, each with its unread count against the
/// member's `last_read_seq` watermark.
pub async fn list_for_user(pool: &PgPool, username: &str) -> Result<Vec<(Session, i64)>> {
    let rows: Vec<(Session, i64)> = sqlx::query_as(
        "SELECT s.session_id, s.session_type, s.name, s.owner_username, s.max_seq_id, \
                (s.max_seq_id - m.last_read_seq) AS unread \
         FROM sessions s JOIN session_members m ON m.session_id = s.session_id \
         WHERE m.username = $1",
    )
    .bind(username)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn contacts(pool: &PgPool, username: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT m2.username FROM session_members m1 \
         JOIN sessions s ON s.session_id = m1.session_id AND s.session_type = 1 \
         JOIN session_members m2 ON m2.session_id = m1.session_id AND m2.username != m1.username \
         WHERE m1.username = $1",
    )
    .bind(username)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(u,)| u).collect())
}

pub async fn search_by_prefix(pool: &PgPool, prefix: &str, limit: i64) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT username FROM users WHERE username LIKE $1 ORDER BY username LIMIT $2",
    )
    .bind(format!("{prefix}%"))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(u,)| u).collect())
}

pub async fn update_read_position(
    pool: &PgPool,
    session_id: &str,
    username: &str,
    seq_id: i64,
) -> Result<i64> {
    sqlx::query(
        "UPDATE session_members SET last_read_seq = $1 \
         WHERE session_id = $2 AND username = $3 AND last_read_seq < $1",
    )
    .bind(seq_id)
    .bind(session_id)
    .bind(username)
    .execute(pool)
    .await?;

    let row: (i64, i64) = sqlx::query_as(
        "SELECT s.max_seq_id, m.last_read_seq FROM sessions s \
         JOIN session_members m ON m.session_id = s.session_id \
         WHERE s.session_id = $1 AND m.username = $2",
    )
    .bind(session_id)
    .bind(username)
    .fetch_one(pool)
    .await?;

    Ok((row.0 - row.1).max(0))
}

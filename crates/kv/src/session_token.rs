//! Opaque bearer tokens issued by Logic's `AuthService`, stored as
//! `resonance:logic:token:{token} -> username` with a long TTL. `ValidateToken`
//! is a single `GET`; nothing about the token's contents is meaningful, so
//! revocation is just a `DEL`.

use redis::AsyncCommands;

use crate::{KvClient, Result};

fn key(token: &str) -> String {
    format!("resonance:logic:token:{token}")
}

pub async fn issue(client: &KvClient, token: &str, username: &str, ttl_secs: u64) -> Result<()> {
    let mut conn = client.conn();
    conn.set_ex::<_, _, ()>(key(token), username, ttl_secs.max(1)).await?;
    Ok(())
}

pub async fn resolve(client: &KvClient, token: &str) -> Result<Option<String>> {
    let mut conn = client.conn();
    let username: Option<String> = conn.get(key(token)).await?;
    Ok(username)
}

pub async fn revoke(client: &KvClient, token: &str) -> Result<()> {
    let mut conn = client.conn();
    conn.del::<_, ()>(key(token)).await?;
    Ok(())
}

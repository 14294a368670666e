//! Ephemeral `username → {gateway_id, remote_ip, timestamp}` mapping.
//!
//! Written on connect, deleted on disconnect, TTL-bounded so a crashed
//! gateway's entries expire on their own.

use redis::AsyncCommands;
use resonance_protocol::RouterEntry;

use crate::{KvClient, Result};

fn key(username: &str) -> String {
    format!("resonance:router:user:{username}")
}

pub async fn set(client: &KvClient, username: &str, entry: &RouterEntry, ttl_ms: u64) -> Result<()> {
    let mut conn = client.conn();
    let payload = serde_json::to_string(entry)?;
    let ttl_secs = ttl_ms.div_ceil(1000).max(1);
    conn.set_ex::<_, _, ()>(key(username), payload, ttl_secs).await?;
    Ok(())
}

pub async fn get(client: &KvClient, username: &str) -> Result<Option<RouterEntry>> {
    let mut conn = client.conn();
    let raw: Option<String> = conn.get(key(username)).await?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Batch lookup, preserving the caller's username order. Missing entries are
/// simply absent from the result map.
pub async fn get_many(
    client: &KvClient,
    usernames: &[String],
) -> Result<std::collections::HashMap<String, RouterEntry>> {
    if usernames.is_empty() {
        return Ok(std::collections::HashMap::new());
    }
    let mut conn = client.conn();
    let keys: Vec<String> = usernames.iter().map(|u| key(u)).collect();
    let raws: Vec<Option<String>> = conn.mget(keys).await?;
    let mut out = std::collections::HashMap::new();
    for (username, raw) in usernames.iter().zip(raws) {
        if let Some(raw) = raw
            && let Ok(entry) = serde_json::from_str::<RouterEntry>(&raw)
        {
            out.insert(username.clone(), entry);
        }
    }
    Ok(out)
}

pub async fn delete(client: &KvClient, username: &str) -> Result<()> {
    let mut conn = client.conn();
    conn.del::<_, ()>(key(username)).await?;
    Ok(())
}

//! Per-session monotonic sequence counter (`resonance:logic:seq:{session_id}`).
//!
//! Backed by Redis `INCR`, which is atomic server-side: concurrent callers
//! across any number of Logic processes still observe strictly increasing
//! values with no duplicates.

use redis::AsyncCommands;

use crate::{KvClient, Result};

fn key(session_id: &str) -> String {
    format!("resonance:logic:seq:{session_id}")
}

/// Allocate the next sequence number for `session_id`. The first call for a
/// session returns 1.
pub async fn next(client: &KvClient, session_id: &str) -> Result<i64> {
    let mut conn = client.conn();
    let value: i64 = conn.incr(key(session_id), 1).await?;
    Ok(value)
}

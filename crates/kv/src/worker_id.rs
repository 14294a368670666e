//! Lease-based worker-id allocation.
//!
//! Each service instance claims a small integer (0..1023, matching the
//! Snowflake worker-id field width) by racing `SET NX EX` across the pool.
//! A background task renews the lease; if renewal ever fails the service
//! must treat its worker-id as gone and shut itself down, since a second
//! process could otherwise claim the same id and produce colliding message
//! ids.

use std::time::Duration;

use redis::AsyncCommands;
use tokio::sync::watch;

use crate::{Error, KvClient, Result};

const POOL_SIZE: u16 = 1024;

/// A leased worker id plus a channel that fires when the lease is lost.
pub struct WorkerIdLease {
    pub worker_id: u16,
    pub lost: watch::Receiver<bool>,
    _keepalive: tokio::task::JoinHandle<()>,
}

/// Acquire a worker id from `prefix`'s pool and start the keep-alive task.
///
/// `lease_ttl` bounds how long the id survives without renewal; renewal runs
/// at `lease_ttl / 3`.
pub async fn acquire(client: KvClient, prefix: &str, lease_ttl: Duration) -> Result<WorkerIdLease> {
    let ttl_secs = lease_ttl.as_secs().max(1);
    let mut conn = client.conn();

    let mut claimed = None;
    for candidate in 0..POOL_SIZE {
        let key = lease_key(prefix, candidate);
        let ok: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map(|v| v.is_some())?;
        if ok {
            claimed = Some(candidate);
            break;
        }
    }

    let worker_id = claimed.ok_or_else(|| Error::WorkerIdPoolExhausted(prefix.to_string()))?;
    let (lost_tx, lost_rx) = watch::channel(false);

    let renew_client = client;
    let prefix = prefix.to_string();
    let renew_interval = lease_ttl / 3;
    let handle = tokio::spawn(async move {
        let key = lease_key(&prefix, worker_id);
        let mut ticker = tokio::time::interval(renew_interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let mut conn = renew_client.conn();
            let renewed: Result<bool, redis::RedisError> =
                conn.expire(&key, ttl_secs as i64).await;
            match renewed {
                Ok(true) => continue,
                Ok(false) | Err(_) => {
                    tracing::error!(worker_id, "worker id lease renewal failed, signalling shutdown");
                    let _ = lost_tx.send(true);
                    return;
                },
            }
        }
    });

    Ok(WorkerIdLease {
        worker_id,
        lost: lost_rx,
        _keepalive: handle,
    })
}

fn lease_key(prefix: &str, candidate: u16) -> String {
    format!("{prefix}:{candidate}")
}

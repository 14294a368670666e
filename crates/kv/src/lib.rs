//! Redis-backed KV store access: the per-session sequencer, the ephemeral
//! user→gateway router, worker-id lease allocation, and Logic's session
//! token store.

pub mod error;
pub mod router;
pub mod sequencer;
pub mod session_token;
pub mod worker_id;

pub use error::{Error, Result};

use redis::aio::ConnectionManager;

/// Shared Redis connection handle. `ConnectionManager` multiplexes and
/// auto-reconnects, so one instance is cloned cheaply into every task that
/// needs KV access (sequencer, router, worker-id lease).
#[derive(Clone)]
pub struct KvClient {
    conn: ConnectionManager,
}

impl KvClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Round-trips a `PING` — used by `/healthz` handlers to report actual
    /// Redis reachability rather than just "the process is up".
    pub async fn ping(&self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn()).await?;
        Ok(())
    }
}

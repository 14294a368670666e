use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use resonance_proto::PresenceEvent;

use crate::rpc::presence_stream::PresenceStreamClient;

/// Batches `onConnect`/`onDisconnect` events and flushes them to Logic as a
/// single `SyncStatus` call per batch, instead of one RPC per connect — see
/// spec §4.1's presence batcher and scenario S4 (200 connects → ⌈200/50⌉
/// RPCs, never 200).
pub struct PresenceBatcher {
    buffer: Mutex<Vec<PresenceEvent>>,
    stream: Arc<PresenceStreamClient>,
    next_seq: AtomicI64,
    batch_size: usize,
}

const DEFAULT_BATCH_SIZE: usize = 50;

impl PresenceBatcher {
    pub fn spawn(stream: Arc<PresenceStreamClient>, flush_interval: Duration, shutdown: CancellationToken) -> Arc<Self> {
        let batcher = Arc::new(Self {
            buffer: Mutex::new(Vec::new()),
            stream,
            next_seq: AtomicI64::new(1),
            batch_size: DEFAULT_BATCH_SIZE,
        });

        let loop_batcher = Arc::clone(&batcher);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        loop_batcher.flush().await;
                        info!("presence batcher: shutdown requested, final flush done");
                        break;
                    },
                    _ = ticker.tick() => {
                        loop_batcher.flush().await;
                    },
                }
            }
        });

        batcher
    }

    pub async fn user_online(&self, username: String, remote_ip: String) {
        self.push(PresenceEvent {
            username,
            online: true,
            remote_ip,
            timestamp: now_ms(),
        })
        .await;
    }

    pub async fn user_offline(&self, username: String) {
        self.push(PresenceEvent {
            username,
            online: false,
            remote_ip: String::new(),
            timestamp: now_ms(),
        })
        .await;
    }

    async fn push(&self, event: PresenceEvent) {
        let should_flush_now = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(event);
            buffer.len() >= self.batch_size
        };
        if should_flush_now {
            self.flush().await;
        }
    }

    /// Copy-and-swap the buffer, then send under no lock — the mutex only
    /// ever guards the `Vec` mutation itself (§5 shared-resource policy).
    async fn flush(&self) {
        let events = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return;
            }
            std::mem::take(&mut *buffer)
        };

        let seq_id = self.next_seq.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.stream.sync_status(seq_id, events).await {
            warn!(error = %e, "presence: flush failed, events dropped for this batch");
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

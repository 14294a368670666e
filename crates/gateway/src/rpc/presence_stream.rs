use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tracing::warn;

use resonance_proto::{
    PresenceEvent, SyncStatusReply, SyncStatusRequest,
    logic_stream_service_client::LogicStreamServiceClient,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("presence stream is broken: {0}")]
    StreamBroken(String),
}

struct StreamHandle {
    id: u64,
    tx: mpsc::Sender<SyncStatusRequest>,
    pending: Arc<Mutex<HashMap<i64, oneshot::Sender<Result<SyncStatusReply, Error>>>>>,
}

/// The presence bidi stream to Logic. Unlike the chat stream, responses are
/// matched by an explicit `seq_id` carried in both request and reply rather
/// than send order, so out-of-order replies are still routed correctly.
///
/// The stream carries this gateway's id as an `x-gateway-id` metadata header
/// set once at open time, since `PresenceEvent` itself has no such field —
/// Logic reads it back off the request to know which `Router` entries to
/// attribute to this gateway.
pub struct PresenceStreamClient {
    client: LogicStreamServiceClient<Channel>,
    gateway_id: String,
    stream: Mutex<Option<StreamHandle>>,
    next_id: AtomicU64,
}

impl PresenceStreamClient {
    pub fn new(client: LogicStreamServiceClient<Channel>, gateway_id: String) -> Arc<Self> {
        Arc::new(Self {
            client,
            gateway_id,
            stream: Mutex::new(None),
            next_id: AtomicU64::new(0),
        })
    }

    pub async fn sync_status(self: &Arc<Self>, seq_id: i64, events: Vec<PresenceEvent>) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let req = SyncStatusRequest { seq_id, events };

        {
            let mut guard = self.stream.lock().await;
            if guard.is_none() {
                *guard = Some(self.open().await?);
            }
            let handle = guard.as_ref().expect("just ensured Some");
            handle.pending.lock().await.insert(seq_id, reply_tx);
            if handle.tx.send(req).await.is_err() {
                handle.pending.lock().await.remove(&seq_id);
                *guard = None;
                return Err(Error::StreamBroken("outbound channel closed".into()));
            }
        }

        let reply = reply_rx
            .await
            .unwrap_or_else(|_| Err(Error::StreamBroken("stream reset before reply".into())))?;
        if reply.error.is_empty() {
            Ok(())
        } else {
            Err(Error::StreamBroken(reply.error))
        }
    }

    /// Opens a new bidi stream with a background receive loop that clears
    /// `self.stream` back to `None` on EOF/error — but only while its `id`
    /// is still the one installed there, so it can't clobber a handle a
    /// concurrent `open()` has since replaced it with.
    async fn open(self: &Arc<Self>) -> Result<StreamHandle, Error> {
        let (tx, rx) = mpsc::channel::<SyncStatusRequest>(16);
        let pending = Arc::new(Mutex::new(HashMap::new()));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut client = self.client.clone();
        let outbound = ReceiverStream::new(rx);
        let mut request = tonic::Request::new(outbound);
        request.metadata_mut().insert(
            "x-gateway-id",
            self.gateway_id.parse().map_err(|_| Error::StreamBroken("gateway id is not a valid header value".into()))?,
        );
        let mut inbound = client
            .presence_stream(request)
            .await
            .map_err(|e| Error::StreamBroken(e.to_string()))?
            .into_inner();

        let recv_pending = Arc::clone(&pending);
        let owner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(reply)) => {
                        if let Some(waiter) = recv_pending.lock().await.remove(&reply.seq_id) {
                            let _ = waiter.send(Ok(reply));
                        }
                    },
                    Ok(None) => {
                        drain(&recv_pending, "presence stream closed by server").await;
                        break;
                    },
                    Err(status) => {
                        warn!(error = %status, "presence stream broken");
                        drain(&recv_pending, &status.to_string()).await;
                        break;
                    },
                }
            }
            let mut guard = owner.stream.lock().await;
            if guard.as_ref().is_some_and(|h| h.id == id) {
                *guard = None;
            }
        });

        Ok(StreamHandle { id, tx, pending })
    }
}

async fn drain(
    pending: &Arc<Mutex<HashMap<i64, oneshot::Sender<Result<SyncStatusReply, Error>>>>>,
    reason: &str,
) {
    let mut map = pending.lock().await;
    for (_, waiter) in map.drain() {
        let _ = waiter.send(Err(Error::StreamBroken(reason.to_string())));
    }
}

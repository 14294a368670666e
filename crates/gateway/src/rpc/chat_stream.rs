use std::{
    collections::VecDeque,
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

use resonance_proto::{ChatSendReply, ChatSendRequest, logic_stream_service_client::LogicStreamServiceClient};

#[derive(Debug, Error)]
pub enum Error {
    #[error("chat stream is broken: {0}")]
    StreamBroken(String),
}

struct StreamHandle {
    id: u64,
    tx: mpsc::Sender<ChatSendRequest>,
    pending: Arc<Mutex<VecDeque<oneshot::Sender<Result<ChatSendReply, Error>>>>>,
}

/// The send-heavy persistent bidi stream to Logic for chat ingestion.
///
/// Responses are matched to callers purely by send order (a FIFO of pending
/// response channels) — this assumes the server replies in send order,
/// trading correlation metadata for a simpler wire format, per spec §4.2.
pub struct ChatStreamClient {
    client: LogicStreamServiceClient<Channel>,
    stream: Mutex<Option<StreamHandle>>,
    next_id: AtomicU64,
}

impl ChatStreamClient {
    pub fn new(client: LogicStreamServiceClient<Channel>) -> Arc<Self> {
        Arc::new(Self {
            client,
            stream: Mutex::new(None),
            next_id: AtomicU64::new(0),
        })
    }

    pub async fn send(self: &Arc<Self>, req: ChatSendRequest) -> Result<ChatSendReply, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut guard = self.stream.lock().await;
            if guard.is_none() {
                *guard = Some(self.open().await?);
            }
            let handle = guard.as_ref().expect("just ensured Some");
            handle.pending.lock().await.push_back(reply_tx);
            if handle.tx.send(req).await.is_err() {
                *guard = None;
                return Err(Error::StreamBroken("outbound channel closed".into()));
            }
        }

        reply_rx
            .await
            .unwrap_or_else(|_| Err(Error::StreamBroken("stream reset before reply".into())))
    }

    /// Opens a new bidi stream with a background receive loop. The loop
    /// holds a reference to `self` and, on EOF/error, clears `self.stream`
    /// back to `None` itself — but only if it's still the handle currently
    /// installed there (its `id` still matches), so a loop for a stream
    /// that's already been superseded by a newer `open()` doesn't clobber
    /// that newer handle.
    async fn open(self: &Arc<Self>) -> Result<StreamHandle, Error> {
        let (tx, rx) = mpsc::channel::<ChatSendRequest>(64);
        let pending = Arc::new(Mutex::new(VecDeque::new()));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut client = self.client.clone();
        let outbound = ReceiverStream::new(rx);
        let mut inbound = client
            .chat_stream(outbound)
            .await
            .map_err(|e| Error::StreamBroken(e.to_string()))?
            .into_inner();

        let recv_pending = Arc::clone(&pending);
        let owner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(reply)) => {
                        if let Some(waiter) = recv_pending.lock().await.pop_front() {
                            let _ = waiter.send(Ok(reply));
                        }
                    },
                    Ok(None) => {
                        drain(&recv_pending, "chat stream closed by server").await;
                        break;
                    },
                    Err(status) => {
                        warn!(error = %status, "chat stream broken");
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
    pending: &Arc<Mutex<VecDeque<oneshot::Sender<Result<ChatSendReply, Error>>>>>,
    reason: &str,
) {
    let mut queue = pending.lock().await;
    while let Some(waiter) = queue.pop_front() {
        let _ = waiter.send(Err(Error::StreamBroken(reason.to_string())));
    }
}

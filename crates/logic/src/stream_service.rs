use std::{pin::Pin, sync::Arc, time::Duration};

use futures::Stream;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::warn;

use resonance_bus::BusPublisher;
use resonance_kv::{KvClient, router};
use resonance_protocol::RouterEntry;
use resonance_proto::{
    ChatSendReply, ChatSendRequest, SyncStatusReply, SyncStatusRequest,
    logic_stream_service_server::LogicStreamService,
};
use resonance_storage::outbox;

use crate::ingest::Ingester;

/// Implements the two persistent bidi streams gateways hold open against
/// Logic: chat ingestion and presence sync, per spec §4.2/§4.3.
pub struct LogicStreamServiceImpl {
    pub ingester: Arc<Ingester>,
    pub publisher: Arc<BusPublisher>,
    pub pool: PgPool,
    pub kv: KvClient,
    pub router_entry_ttl: Duration,
}

#[tonic::async_trait]
impl LogicStreamService for LogicStreamServiceImpl {
    type ChatStreamStream = Pin<Box<dyn Stream<Item = Result<ChatSendReply, Status>> + Send + 'static>>;

    async fn chat_stream(&self, request: Request<Streaming<ChatSendRequest>>) -> Result<Response<Self::ChatStreamStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(64);

        let ingester = Arc::clone(&self.ingester);
        let publisher = Arc::clone(&self.publisher);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            // Requests are handled one at a time, in arrival order, so replies
            // land on the wire in the same order the gateway's FIFO pending
            // queue expects them (see gateway's chat_stream.rs client).
            loop {
                let req = match inbound.message().await {
                    Ok(Some(req)) => req,
                    Ok(None) => break,
                    Err(status) => {
                        warn!(error = %status, "logic: chat stream read failed");
                        break;
                    },
                };
                let reply = handle_chat_send(&ingester, &publisher, &pool, req).await;
                if tx.send(Ok(reply)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    type PresenceStreamStream = Pin<Box<dyn Stream<Item = Result<SyncStatusReply, Status>> + Send + 'static>>;

    async fn presence_stream(&self, request: Request<Streaming<SyncStatusRequest>>) -> Result<Response<Self::PresenceStreamStream>, Status> {
        let gateway_id = request
            .metadata()
            .get("x-gateway-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(16);

        let kv = self.kv.clone();
        let ttl = self.router_entry_ttl;

        tokio::spawn(async move {
            loop {
                let req = match inbound.message().await {
                    Ok(Some(req)) => req,
                    Ok(None) => break,
                    Err(status) => {
                        warn!(error = %status, "logic: presence stream read failed");
                        break;
                    },
                };
                let reply = handle_sync_status(&kv, &gateway_id, ttl, req).await;
                if tx.send(Ok(reply)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

async fn handle_chat_send(ingester: &Ingester, publisher: &BusPublisher, pool: &PgPool, req: ChatSendRequest) -> ChatSendReply {
    let ingested = match ingester.ingest(&req.session_id, &req.from_username, &req.content, &req.msg_type).await {
        Ok(ingested) => ingested,
        Err(e) => {
            return ChatSendReply {
                client_seq: req.client_seq,
                msg_id: String::new(),
                seq_id: 0,
                error: e.to_string(),
            };
        },
    };

    // Best-effort immediate publish, per spec §4.3 step 5 — if this fails
    // the outbox relay still picks the row up within one tick.
    match publisher.publish(&ingested.event).await {
        Ok(()) => {
            if let Err(e) = outbox::mark_sent_by_msg_id(pool, &ingested.event.msg_id).await {
                warn!(msg_id = %ingested.event.msg_id, error = %e, "logic: failed marking outbox row sent after immediate publish");
            }
        },
        Err(e) => {
            warn!(msg_id = %ingested.event.msg_id, error = %e, "logic: immediate publish failed, deferring to outbox relay");
        },
    }

    ChatSendReply {
        client_seq: req.client_seq,
        msg_id: ingested.event.msg_id,
        seq_id: ingested.event.seq_id,
        error: String::new(),
    }
}

async fn handle_sync_status(kv: &KvClient, gateway_id: &str, ttl: Duration, req: SyncStatusRequest) -> SyncStatusReply {
    for event in &req.events {
        let result = if event.online {
            let entry = RouterEntry {
                gateway_id: gateway_id.to_string(),
                remote_ip: event.remote_ip.clone(),
                timestamp: event.timestamp,
            };
            router::set(kv, &event.username, &entry, ttl.as_millis() as u64).await
        } else {
            router::delete(kv, &event.username).await
        };
        if let Err(e) = result {
            warn!(username = %event.username, error = %e, "logic: presence router update failed");
            return SyncStatusReply {
                seq_id: req.seq_id,
                error: e.to_string(),
            };
        }
    }
    SyncStatusReply {
        seq_id: req.seq_id,
        error: String::new(),
    }
}

use std::sync::Arc;

use tonic::{Request, Response, Status};

use resonance_proto::{
    HealthCheckReply, HealthCheckRequest, PushReply, PushRequest,
    push_service_server::PushService,
};

use crate::state::{GatewayState, TrySendError};

/// Gateway-side `Push` RPC: Task calls this to deliver one message to
/// whichever usernames in `to_usernames` are connected to this gateway.
/// The push frame is encoded once and fanned out to each local connection's
/// outbound queue; usernames not present locally are reported back as
/// `failed_usernames` so the caller can treat the route as stale, per §4.1.
pub struct PushServiceImpl {
    state: Arc<GatewayState>,
}

impl PushServiceImpl {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl PushService for PushServiceImpl {
    async fn push(&self, request: Request<PushRequest>) -> Result<Response<PushReply>, Status> {
        let req = request.into_inner();
        let Some(message) = req.message else {
            return Err(Status::invalid_argument("missing message"));
        };

        let push = resonance_protocol::Push {
            msg_id: message.msg_id,
            seq_id: message.seq_id,
            session_id: message.session_id,
            from_username: message.from_username,
            content: message.content,
            r#type: message.msg_type,
            timestamp: message.timestamp,
            session_meta: Some(resonance_protocol::SessionMeta {
                name: message.session_name,
                r#type: message.session_type,
            }),
        };
        let packet = resonance_protocol::Packet::new(uuid::Uuid::new_v4().to_string(), resonance_protocol::Payload::Push(push));
        let frame = serde_json::to_string(&packet)
            .map_err(|e| Status::internal(format!("failed to encode push frame: {e}")))?;

        let mut failed_usernames = Vec::new();
        let clients = self.state.clients.read().await;
        for username in req.to_usernames {
            match clients.get(&username) {
                Some(client) => match client.try_send(frame.clone()) {
                    Ok(()) => {},
                    Err(TrySendError::Full | TrySendError::Closed) => failed_usernames.push(username),
                },
                None => failed_usernames.push(username),
            }
        }

        Ok(Response::new(PushReply { failed_usernames }))
    }

    async fn health_check(&self, _request: Request<HealthCheckRequest>) -> Result<Response<HealthCheckReply>, Status> {
        Ok(Response::new(HealthCheckReply {
            ok: true,
            detail: String::new(),
        }))
    }
}

use std::{net::SocketAddr, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

use resonance_protocol::{Ack, Packet, Payload, Pulse};
use resonance_proto::ChatSendRequest;

use crate::state::{ConnectedClient, GatewayState};

/// Handle a single WebSocket connection: bearer-token auth, registration,
/// a single select loop covering reads, queued writes, pulses, and eviction,
/// then cleanup. The first message is never special-cased — auth happens at
/// upgrade time via the `Authorization` header or `?token=` query parameter,
/// per spec §4.1.
///
/// Read and write share one loop (rather than two tasks) so that an eviction
/// notification can both stop the read side and send a close frame on the
/// write side without needing a second handle into the other task.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, remote_addr: SocketAddr, token: String) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let remote_ip = remote_addr.ip().to_string();

    let username = match state.validator.validate(&token).await {
        Ok(username) => username,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "ws: token validation failed");
            return;
        },
    };

    info!(conn_id = %conn_id, %username, remote_ip = %remote_ip, "ws: connection established");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::channel::<String>(state.config.outbound_queue_capacity);
    let evict = Arc::new(Notify::new());

    let client = ConnectedClient {
        conn_id: conn_id.clone(),
        remote_ip: remote_ip.clone(),
        sender: client_tx.clone(),
        evict: Arc::clone(&evict),
    };
    state.register_client(&username, client, remote_ip.clone()).await;

    let pulse_interval = state.config.pulse_interval();
    // Read deadline: reset on every inbound frame, doubled against the
    // pulse interval so one missed client pulse doesn't trip it.
    let read_deadline = pulse_interval * 2;
    let mut ticker = tokio::time::interval(pulse_interval);
    ticker.tick().await; // first tick fires immediately

    'conn: loop {
        tokio::select! {
            frame = client_rx.recv() => {
                let Some(frame) = frame else { break 'conn };
                if ws_tx.send(Message::Binary(frame.into())).await.is_err() {
                    debug!(conn_id = %conn_id, "ws: write failed, closing");
                    break 'conn;
                }
            },
            _ = ticker.tick() => {
                let pulse = Packet::new(uuid::Uuid::new_v4().to_string(), Payload::Pulse(Pulse::default()));
                if let Ok(frame) = serde_json::to_vec(&pulse)
                    && ws_tx.send(Message::Binary(frame.into())).await.is_err()
                {
                    debug!(conn_id = %conn_id, "ws: write failed, closing");
                    break 'conn;
                }
            },
            () = evict.notified() => {
                debug!(conn_id = %conn_id, %username, "ws: evicted by a newer connection, closing");
                let _ = ws_tx.send(Message::Close(None)).await;
                break 'conn;
            },
            timed_out = tokio::time::timeout(read_deadline, ws_rx.next()) => {
                let msg = match timed_out {
                    Ok(Some(msg)) => msg,
                    Ok(None) => break 'conn,
                    Err(_) => {
                        debug!(conn_id = %conn_id, "ws: read deadline exceeded, closing");
                        break 'conn;
                    },
                };

                let payload = match msg {
                    Ok(Message::Binary(b)) => b,
                    Ok(Message::Close(_)) => break 'conn,
                    Ok(_) => continue 'conn,
                    Err(e) => {
                        debug!(conn_id = %conn_id, error = %e, "ws: read error");
                        break 'conn;
                    },
                };

                if payload.len() > state.config.max_payload_bytes {
                    warn!(conn_id = %conn_id, size = payload.len(), "ws: payload too large");
                    continue 'conn;
                }

                let packet: Packet = match serde_json::from_slice(&payload) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(conn_id = %conn_id, error = %e, "ws: invalid packet, dropped");
                        continue 'conn;
                    },
                };

                handle_packet(&state, &username, &conn_id, &client_tx, packet).await;
            },
        }
    }

    state.remove_client(&username, &conn_id).await;
    info!(conn_id = %conn_id, %username, "ws: connection closed");
}

async fn handle_packet(
    state: &Arc<GatewayState>,
    username: &str,
    conn_id: &str,
    client_tx: &mpsc::Sender<String>,
    packet: Packet,
) {
    match packet.payload {
        Payload::Pulse(_) => {
            send(client_tx, conn_id, Packet::new(packet.seq, Payload::Pulse(Default::default())));
        },
        Payload::Ack(_) => {
            // Liveness signal only — the gateway never waits on client acks.
        },
        Payload::Push(_) => {
            debug!(conn_id, username, "ws: client sent a push frame, ignored");
        },
        Payload::Chat(chat) => {
            let session_id = chat.session_id.clone();
            let req = ChatSendRequest {
                client_seq: packet.seq.clone(),
                session_id: chat.session_id,
                from_username: username.to_string(),
                to_username: chat.to_username,
                content: chat.content,
                msg_type: chat.r#type,
                trace_id: String::new(),
            };
            let ack = match state.chat_stream.send(req).await {
                Ok(reply) if reply.error.is_empty() => {
                    Ack::ok(reply.client_seq, reply.msg_id, reply.seq_id, session_id)
                },
                Ok(reply) => Ack::failed(reply.client_seq, reply.error),
                Err(e) => Ack::failed(packet.seq, e.to_string()),
            };
            send(client_tx, conn_id, Packet::new(ack.ref_seq.clone(), Payload::Ack(ack)));
        },
    }
}

fn send(client_tx: &mpsc::Sender<String>, conn_id: &str, packet: Packet) {
    match serde_json::to_string(&packet) {
        Ok(frame) => {
            if client_tx.try_send(frame).is_err() {
                debug!(conn_id, "ws: outbound queue full or closed, frame dropped");
            }
        },
        Err(e) => warn!(conn_id, error = %e, "ws: failed to encode outbound packet"),
    }
}

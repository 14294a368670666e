//! Gateway-client wire protocol.
//!
//! One `Packet` per WebSocket binary message, JSON-encoded. `Packet.payload`
//! is a tagged union of `Pulse` (keepalive), `Chat` (client send), `Ack`
//! (delivery acknowledgement, either direction), and `Push` (server
//! delivery). Clients never send `Push`.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB
pub const MAX_BUFFERED_BYTES: usize = 1_572_864; // 1.5 MB — outbound channel capacity guidance
pub const PULSE_INTERVAL_MS: u64 = 30_000; // 30s
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // 10s
pub const PRESENCE_BATCH_SIZE: usize = 50;
pub const PRESENCE_FLUSH_INTERVAL_MS: u64 = 100;

/// Top-level frame carried over one WebSocket binary message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    /// Client-supplied correlation id, echoed on the matching `Ack`.
    pub seq: String,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Packet {
    #[must_use]
    pub fn new(seq: impl Into<String>, payload: Payload) -> Self {
        Self {
            seq: seq.into(),
            payload,
        }
    }
}

/// Discriminated union of packet bodies. `type` is the wire discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Pulse(Pulse),
    Chat(Chat),
    Ack(Ack),
    Push(Push),
}

/// Client ↔ server keepalive. Carries no fields; presence is the signal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pulse {}

/// Client → server send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub session_id: String,
    pub from_username: String,
    pub to_username: String,
    pub content: String,
    pub r#type: String,
    /// Epoch seconds.
    pub timestamp: i64,
}

/// Server → client delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Push {
    pub msg_id: String,
    pub seq_id: i64,
    pub session_id: String,
    pub from_username: String,
    pub content: String,
    pub r#type: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_meta: Option<SessionMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub name: String,
    pub r#type: i32,
}

/// Delivery acknowledgement, either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    /// The `seq` of the packet being acknowledged.
    pub ref_seq: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    #[must_use]
    pub fn ok(ref_seq: impl Into<String>, msg_id: impl Into<String>, seq_id: i64, session_id: impl Into<String>) -> Self {
        Self {
            ref_seq: ref_seq.into(),
            msg_id: Some(msg_id.into()),
            seq_id: Some(seq_id),
            session_id: Some(session_id.into()),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(ref_seq: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ref_seq: ref_seq.into(),
            msg_id: None,
            seq_id: None,
            session_id: None,
            error: Some(error.into()),
        }
    }
}

// ── Fan-out event (bus payload) ─────────────────────────────────────────────

/// Event published to `resonance.push.event.v1` on successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutEvent {
    pub msg_id: String,
    pub seq_id: i64,
    pub session_id: String,
    pub from_username: String,
    pub content: String,
    pub r#type: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub trace_headers: std::collections::HashMap<String, String>,
}

// ── Router (KV-backed presence mapping) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterEntry {
    pub gateway_id: String,
    pub remote_ip: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_packet_round_trips_through_json() {
        let packet = Packet::new(
            "c-1",
            Payload::Chat(Chat {
                session_id: "s1".into(),
                from_username: "alice".into(),
                to_username: "bob".into(),
                content: "hi".into(),
                r#type: "text".into(),
                timestamp: 1_700_000_000,
            }),
        );
        let json = serde_json::to_string(&packet).unwrap();
        let back: Packet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, "c-1");
        match back.payload {
            Payload::Chat(chat) => assert_eq!(chat.content, "hi"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn ack_failed_has_no_msg_id() {
        let ack = Ack::failed("c-2", "session not found");
        let json = serde_json::to_value(&ack).unwrap();
        assert!(json.get("msg_id").is_none());
        assert_eq!(json["error"], "session not found");
    }
}

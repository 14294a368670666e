use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Notify, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use resonance_auth::TokenValidator;
use resonance_config::GatewayConfig;

use crate::{
    presence::PresenceBatcher,
    rpc::{chat_stream::ChatStreamClient, presence_stream::PresenceStreamClient},
};

/// A WebSocket client currently connected to this gateway, keyed by
/// username — the connection manager enforces the single-session-per-user
/// invariant from spec §4.1/§8.2.
pub struct ConnectedClient {
    pub conn_id: String,
    pub remote_ip: String,
    pub sender: mpsc::Sender<String>,
    /// Fired by `register_client` when this connection is evicted, so its
    /// own read/write loop can send a close frame and tear itself down
    /// immediately instead of lingering until its read deadline expires.
    pub evict: Arc<Notify>,
}

impl ConnectedClient {
    /// Non-blocking best-effort send; a full outbound queue is reported to
    /// the caller rather than silently dropping the connection (§5 shared
    /// resource policy: "non-blocking try-send... returns buffer full").
    pub fn try_send(&self, frame: String) -> Result<(), TrySendError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TrySendError::Full,
            mpsc::error::TrySendError::Closed(_) => TrySendError::Closed,
        })
    }
}

#[derive(Debug)]
pub enum TrySendError {
    Full,
    Closed,
}

/// Shared gateway runtime state.
pub struct GatewayState {
    pub gateway_id: String,
    pub config: GatewayConfig,
    pub clients: RwLock<HashMap<String, ConnectedClient>>,
    pub validator: Arc<TokenValidator>,
    pub chat_stream: Arc<ChatStreamClient>,
    pub presence: Arc<PresenceBatcher>,
}

impl GatewayState {
    pub fn new(
        gateway_id: String,
        config: GatewayConfig,
        validator: Arc<TokenValidator>,
        chat_stream: Arc<ChatStreamClient>,
        presence_stream: Arc<PresenceStreamClient>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let presence = PresenceBatcher::spawn(presence_stream, config.presence_flush_interval(), shutdown);
        Arc::new(Self {
            gateway_id,
            config,
            clients: RwLock::new(HashMap::new()),
            validator,
            chat_stream,
            presence,
        })
    }

    /// Replace-then-callback registration: evicts and closes any existing
    /// connection for `username` before installing the new one, then fires
    /// `onConnect` exactly once via the presence batcher.
    pub async fn register_client(&self, username: &str, client: ConnectedClient, remote_ip: String) {
        let previous = {
            let mut clients = self.clients.write().await;
            clients.insert(username.to_string(), client)
        };
        if let Some(prev) = previous {
            info!(username, conn_id = %prev.conn_id, "gateway: evicting previous connection");
            prev.evict.notify_one();
        } else {
            metrics::counter!("resonance_gateway_connections_total").increment(1);
        }
        metrics::gauge!("resonance_gateway_connected_clients").set(self.client_count().await as f64);
        self.presence.user_online(username.to_string(), remote_ip).await;
    }

    /// Remove a client iff `conn_id` still matches the one on file — guards
    /// against a stale cleanup task racing an eviction and firing a bogus
    /// offline event for the *new* connection.
    pub async fn remove_client(&self, username: &str, conn_id: &str) {
        let removed = {
            let mut clients = self.clients.write().await;
            match clients.get(username) {
                Some(c) if c.conn_id == conn_id => clients.remove(username),
                _ => None,
            }
        };
        if removed.is_some() {
            metrics::gauge!("resonance_gateway_connected_clients").set(self.client_count().await as f64);
            self.presence.user_offline(username.to_string()).await;
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use resonance_proto::{auth_service_client::AuthServiceClient, logic_stream_service_client::LogicStreamServiceClient};
    use tonic::transport::Channel;

    /// A channel that never actually connects; fine for tests that never
    /// trigger an RPC, since `connect_lazy` defers dialing to first use.
    fn lazy_channel() -> Channel {
        Channel::from_static("http://127.0.0.1:1").connect_lazy()
    }

    fn test_state() -> Arc<GatewayState> {
        let channel = lazy_channel();
        let validator = TokenValidator::new(AuthServiceClient::new(channel.clone()), std::time::Duration::from_secs(10), 100);
        let logic_stream_client = LogicStreamServiceClient::new(channel);
        let chat_stream = ChatStreamClient::new(logic_stream_client.clone());
        let presence_stream = PresenceStreamClient::new(logic_stream_client, "gw-test".into());
        GatewayState::new(
            "gw-test".into(),
            GatewayConfig::default(),
            validator,
            chat_stream,
            presence_stream,
            CancellationToken::new(),
        )
    }

    fn connected_client() -> (ConnectedClient, mpsc::Receiver<String>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(8);
        let evict = Arc::new(Notify::new());
        (
            ConnectedClient {
                conn_id: uuid::Uuid::new_v4().to_string(),
                remote_ip: "127.0.0.1".into(),
                sender: tx,
                evict: Arc::clone(&evict),
            },
            rx,
            evict,
        )
    }

    #[tokio::test]
    async fn second_connect_evicts_first() {
        let state = test_state();
        let (client_a, _rx_a, evict_a) = connected_client();
        let conn_id_a = client_a.conn_id.clone();
        state.register_client("alice", client_a, "127.0.0.1".into()).await;
        assert_eq!(state.client_count().await, 1);

        let (client_b, _rx_b, _evict_b) = connected_client();
        state.register_client("alice", client_b, "127.0.0.2".into()).await;

        assert_eq!(state.client_count().await, 1);
        // The first connection's own loop is told to close itself, rather
        // than relying on its sender being dropped (a second clone of that
        // sender is always still held by the connection's own task).
        evict_a.notified().await;

        // A stale remove for the evicted conn_id must not touch the new connection.
        state.remove_client("alice", &conn_id_a).await;
        assert_eq!(state.client_count().await, 1);
    }

    #[tokio::test]
    async fn remove_client_matching_conn_id_clears_entry() {
        let state = test_state();
        let (client, _rx, _evict) = connected_client();
        let conn_id = client.conn_id.clone();
        state.register_client("bob", client, "127.0.0.1".into()).await;

        state.remove_client("bob", &conn_id).await;
        assert_eq!(state.client_count().await, 0);
    }
}

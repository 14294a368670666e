//! Per-process manager of outbound gRPC connections to gateway instances,
//! per spec §4.5.2's `GatewayClient`/`GatewayClient manager` description.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tracing::{info, warn};

use resonance_proto::{PushMessage, PushRequest, push_service_client::PushServiceClient};
use resonance_registry::Registry;

const PUSH_RPC_TIMEOUT: Duration = Duration::from_secs(3);

pub struct PushTask {
    pub to_usernames: Vec<String>,
    pub message: PushMessage,
}

/// One gRPC connection to a gateway instance, a bounded task queue, and
/// `pusher_count` worker tasks draining it.
pub struct GatewayClient {
    tx: mpsc::Sender<PushTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl GatewayClient {
    pub fn connect(endpoint: &str, queue_size: usize, pusher_count: usize) -> anyhow::Result<Self> {
        let channel = Channel::from_shared(endpoint.to_string())?.connect_lazy();
        let client = PushServiceClient::new(channel);
        let (tx, rx) = mpsc::channel(queue_size);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(pusher_count);
        for _ in 0..pusher_count {
            let rx = Arc::clone(&rx);
            let mut client = client.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let task = { rx.lock().await.recv().await };
                    let Some(task) = task else { break };
                    let req = tonic::Request::new(PushRequest {
                        to_usernames: task.to_usernames,
                        message: Some(task.message),
                    });
                    match tokio::time::timeout(PUSH_RPC_TIMEOUT, client.push(req)).await {
                        Ok(Ok(reply)) => {
                            let failed = reply.into_inner().failed_usernames;
                            if !failed.is_empty() {
                                warn!(?failed, "push: some recipients failed delivery");
                            }
                        },
                        Ok(Err(status)) => warn!(error = %status, "push rpc failed"),
                        Err(_) => warn!("push rpc timed out after {PUSH_RPC_TIMEOUT:?}"),
                    }
                }
            }));
        }

        Ok(Self { tx, workers })
    }

    /// Non-blocking; a full queue is the caller's signal to Nak the bus
    /// message for redelivery rather than block the consumer worker.
    pub fn enqueue(&self, task: PushTask) -> Result<(), mpsc::error::TrySendError<PushTask>> {
        self.tx.try_send(task)
    }

    pub async fn close(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Polls the registry for `gateway` instances and keeps one `GatewayClient`
/// per live instance, creating/closing them as instances appear/vanish.
pub struct GatewayManager {
    registry: Registry,
    clients: RwLock<HashMap<String, GatewayClient>>,
    queue_size: usize,
    pusher_count: usize,
}

impl GatewayManager {
    #[must_use]
    pub fn new(registry: Registry, queue_size: usize, pusher_count: usize) -> Arc<Self> {
        Arc::new(Self {
            registry,
            clients: RwLock::new(HashMap::new()),
            queue_size,
            pusher_count,
        })
    }

    pub fn spawn_poller(self: &Arc<Self>, poll_interval: Duration, shutdown: CancellationToken) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("gateway manager: poller stopping");
                        break;
                    },
                    _ = ticker.tick() => {
                        manager.reconcile().await;
                    },
                }
            }
        });
    }

    /// Closes every live gateway client's queue and waits for its pushers
    /// to drain — the "close queues" step of the binary's teardown.
    pub async fn close_all(&self) {
        let clients: Vec<GatewayClient> = self.clients.write().await.drain().map(|(_, c)| c).collect();
        for client in clients {
            client.close().await;
        }
    }

    async fn reconcile(&self) {
        let instances = match self.registry.list("gateway").await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(error = %e, "gateway manager: registry list failed");
                return;
            },
        };
        let live: HashMap<String, String> = instances.into_iter().map(|i| (i.instance_id, i.endpoint)).collect();

        let stale: Vec<String> = {
            let clients = self.clients.read().await;
            clients.keys().filter(|id| !live.contains_key(*id)).cloned().collect()
        };
        for gateway_id in stale {
            let removed = self.clients.write().await.remove(&gateway_id);
            if let Some(client) = removed {
                client.close().await;
            }
        }

        for (gateway_id, endpoint) in live {
            if self.clients.read().await.contains_key(&gateway_id) {
                continue;
            }
            match GatewayClient::connect(&endpoint, self.queue_size, self.pusher_count) {
                Ok(client) => {
                    self.clients.write().await.insert(gateway_id, client);
                },
                Err(e) => warn!(%gateway_id, error = %e, "gateway manager: failed to connect"),
            }
        }
    }

    pub async fn enqueue(&self, gateway_id: &str, task: PushTask) -> anyhow::Result<()> {
        let clients = self.clients.read().await;
        let client = clients
            .get(gateway_id)
            .ok_or_else(|| anyhow::anyhow!("no client for gateway {gateway_id}"))?;
        client.enqueue(task).map_err(|_| anyhow::anyhow!("push queue full for gateway {gateway_id}"))
    }
}

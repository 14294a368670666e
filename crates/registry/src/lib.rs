//! Service registry client backed by etcd, under the `/resonance/services`
//! namespace. Each instance self-registers with a leased key that it
//! renews; other services discover peers by listing the namespace prefix
//! rather than watching, matching Task's poll-based gateway discovery.

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use etcd_client::{Client, GetOptions, PutOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub endpoint: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct Registry {
    client: Client,
    namespace: String,
}

/// A live registration. Dropping this does not deregister the instance —
/// the lease's natural expiry (after `lease_lost` fires) does that instead,
/// matching the spec's "worker-id lease lost → shut down" failure model.
pub struct Registration {
    pub lost: watch::Receiver<bool>,
    _keepalive: tokio::task::JoinHandle<()>,
}

impl Registration {
    /// Stops renewing the lease so etcd reclaims the key at its next TTL
    /// expiry instead of this instance keeping it alive past shutdown.
    pub fn close(self) {
        self._keepalive.abort();
    }
}

impl Registry {
    pub async fn connect(endpoints: &[String], namespace: impl Into<String>) -> Result<Self> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self {
            client,
            namespace: namespace.into(),
        })
    }

    fn key(&self, service_name: &str, instance_id: &str) -> String {
        format!("{}/{}/{}", self.namespace, service_name, instance_id)
    }

    /// Register `instance` under `service_name` with a lease of `ttl`,
    /// renewing automatically. The keep-alive loop exits and reports loss
    /// through `Registration::lost` if renewal ever fails.
    pub async fn register(
        &self,
        service_name: &str,
        instance: &ServiceInstance,
        ttl: Duration,
    ) -> Result<Registration> {
        let mut client = self.client.clone();
        let ttl_secs = ttl.as_secs().max(1) as i64;

        let lease = client.lease_grant(ttl_secs, None).await?;
        let lease_id = lease.id();

        let key = self.key(service_name, &instance.instance_id);
        let value = serde_json::to_vec(instance)?;
        client
            .put(key.clone(), value, Some(PutOptions::new().with_lease(lease_id)))
            .await?;

        let (lost_tx, lost_rx) = watch::channel(false);
        let (mut keeper, mut keep_stream) = client.lease_keep_alive(lease_id).await?;
        let renew_interval = ttl / 3;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(renew_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if keeper.keep_alive().await.is_err() {
                    tracing::error!(%key, "registry lease renewal failed, signalling shutdown");
                    let _ = lost_tx.send(true);
                    return;
                }
                if keep_stream.message().await.is_err() {
                    tracing::error!(%key, "registry lease keep-alive stream closed");
                    let _ = lost_tx.send(true);
                    return;
                }
            }
        });

        Ok(Registration {
            lost: lost_rx,
            _keepalive: handle,
        })
    }

    /// List all live instances of `service_name`. Expired leases disappear
    /// from this list automatically, so this doubles as liveness discovery.
    pub async fn list(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let prefix = format!("{}/{}/", self.namespace, service_name);
        let mut client = self.client.clone();
        let resp = client
            .get(prefix.clone(), Some(GetOptions::new().with_prefix()))
            .await?;

        let mut instances = Vec::new();
        for kv in resp.kvs() {
            match serde_json::from_slice::<ServiceInstance>(kv.value()) {
                Ok(instance) => instances.push(instance),
                Err(e) => tracing::warn!(error = %e, "skipping malformed registry entry"),
            }
        }
        Ok(instances)
    }
}

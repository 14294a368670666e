use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use resonance_config::discover_and_load;
use resonance_kv::{KvClient, worker_id};
use resonance_registry::{Registry, ServiceInstance};
use resonance_task::{
    consumer_pool::ConsumerPool, gateway_manager::GatewayManager, push_consumer::PushHandler, storage_consumer::StorageHandler,
};

const FETCH_BATCH: usize = 50;
const MAX_RETRY: u32 = 3;
const RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = discover_and_load();
    let instance_id = uuid::Uuid::new_v4().to_string();

    if config.task.metrics_bind.is_empty() {
        tracing::info!("task: metrics exporter disabled (empty bind address)");
    } else {
        resonance_common::metrics::install(&config.task.metrics_bind)?;
    }

    let pool = resonance_storage::connect(&config.storage.dsn, config.storage.max_connections).await?;
    let kv = KvClient::connect(&config.kv.url).await?;
    let lease = worker_id::acquire(kv.clone(), &config.kv.worker_id_prefix_for("task"), config.kv.worker_id_lease()).await?;
    tracing::info!(worker_id = lease.worker_id, "task: worker id leased");

    let js = resonance_bus::connect(&config.bus.url, &config.bus.stream_name, &config.bus.push_subject).await?;
    let registry = Registry::connect(&config.registry.endpoints, config.registry.namespace.clone()).await?;
    let registration = registry
        .register(
            "task",
            &ServiceInstance {
                instance_id: instance_id.clone(),
                endpoint: String::new(),
                metadata: serde_json::json!({}),
            },
            std::time::Duration::from_secs(config.registry.lease_ttl_secs.max(1) as u64),
        )
        .await?;

    let storage_consumer = resonance_bus::BusConsumer::bind(
        &js,
        &config.bus.stream_name,
        &config.task.consumer_group_storage,
        &config.bus.push_subject,
    )
    .await?;
    let storage_handler = Arc::new(StorageHandler { pool: pool.clone() });
    let storage_pool = ConsumerPool::new(
        "storage",
        storage_consumer,
        storage_handler,
        4,
        FETCH_BATCH,
        MAX_RETRY,
        RETRY_INTERVAL,
    );

    let manager = GatewayManager::new(registry, config.task.push_queue_capacity, config.task.pushers_per_gateway);

    let shutdown = CancellationToken::new();
    manager.spawn_poller(config.task.registry_poll_interval(), shutdown.clone());

    let push_consumer = resonance_bus::BusConsumer::bind(
        &js,
        &config.bus.stream_name,
        &config.task.consumer_group_push,
        &config.bus.push_subject,
    )
    .await?;
    let push_handler = Arc::new(PushHandler {
        pool: pool.clone(),
        kv: kv.clone(),
        manager: Arc::clone(&manager),
    });
    let push_pool = ConsumerPool::new("push", push_consumer, push_handler, 4, FETCH_BATCH, MAX_RETRY, RETRY_INTERVAL);

    {
        let shutdown = shutdown.clone();
        let mut registry_lost = registration.lost.clone();
        let mut worker_lost = lease.lost.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = resonance_common::shutdown::signal_received() => {},
                _ = registry_lost.changed() => tracing::error!("task: registry lease lost"),
                _ = worker_lost.changed() => tracing::error!("task: worker id lease lost"),
            }
            shutdown.cancel();
        });
    }

    tracing::info!("task starting: storage and push consumers running");

    tokio::join!(storage_pool.run(shutdown.clone()), push_pool.run(shutdown.clone()));

    tracing::info!("task: consumers stopped, closing gateway queues, registry and storage handles");
    let _ = tokio::time::timeout(resonance_common::shutdown::SHUTDOWN_BUDGET, async {
        manager.close_all().await;
        registration.close();
        drop(kv);
        pool.close().await;
    })
    .await;

    Ok(())
}

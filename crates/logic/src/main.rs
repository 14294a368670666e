use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

use resonance_config::{ResonanceConfig, discover_and_load};
use resonance_ids::SnowflakeGenerator;
use resonance_kv::{KvClient, worker_id};
use resonance_logic::{
    auth_service::AuthServiceImpl, ingest::Ingester, outbox_relay, session_service::SessionServiceImpl,
    stream_service::LogicStreamServiceImpl,
};
use resonance_proto::{
    auth_service_server::AuthServiceServer, logic_stream_service_server::LogicStreamServiceServer,
    session_service_server::SessionServiceServer,
};
use resonance_registry::{Registry, ServiceInstance};

#[derive(Parser, Debug)]
#[command(name = "resonance-logic")]
struct Args {
    /// Address other services reach this instance's RPCs on, advertised to the registry.
    #[arg(long, env = "RESONANCE_LOGIC_ENDPOINT")]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let args = Args::parse();
    let config: ResonanceConfig = discover_and_load();
    let instance_id = uuid::Uuid::new_v4().to_string();

    if config.logic.metrics_bind.is_empty() {
        tracing::info!("logic: metrics exporter disabled (empty bind address)");
    } else {
        resonance_common::metrics::install(&config.logic.metrics_bind)?;
    }

    let pool = resonance_storage::connect(&config.storage.dsn, config.storage.max_connections).await?;
    resonance_storage::run_migrations(&pool).await?;

    let kv = KvClient::connect(&config.kv.url).await?;
    let lease = worker_id::acquire(kv.clone(), &config.kv.worker_id_prefix_for("logic"), config.kv.worker_id_lease()).await?;
    tracing::info!(worker_id = lease.worker_id, "logic: worker id leased");
    let ids = Arc::new(SnowflakeGenerator::new(lease.worker_id)?);

    let js = resonance_bus::connect(&config.bus.url, &config.bus.stream_name, &config.bus.push_subject).await?;
    let publisher = resonance_bus::BusPublisher::new(js, config.bus.push_subject.clone());

    let ingester = Arc::new(Ingester {
        pool: pool.clone(),
        kv: kv.clone(),
        ids,
        outbox_topic: config.bus.push_subject.clone(),
    });

    let shutdown = CancellationToken::new();

    let relay_pool = pool.clone();
    let relay_publisher = publisher.clone();
    let outbox_tick = config.logic.outbox_tick();
    let outbox_batch_size = config.logic.outbox_batch_size;
    let outbox_max_retries = config.logic.outbox_max_retries as i32;
    let relay_shutdown = shutdown.clone();
    let relay_handle = tokio::spawn(async move {
        outbox_relay::run(relay_pool, relay_publisher, outbox_tick, outbox_batch_size, outbox_max_retries, relay_shutdown).await;
    });

    let close_pool = pool.clone();
    let close_kv = kv.clone();

    let auth_service = AuthServiceImpl {
        pool: pool.clone(),
        kv: kv.clone(),
        token_ttl: Duration::from_secs(config.auth.session_token_ttl_secs),
    };
    let session_service = SessionServiceImpl { pool: pool.clone() };
    let stream_service = LogicStreamServiceImpl {
        ingester,
        publisher: Arc::new(publisher),
        pool,
        kv,
        router_entry_ttl: config.kv.router_entry_ttl(),
    };

    let registry = Registry::connect(&config.registry.endpoints, config.registry.namespace.clone()).await?;
    let rpc_addr: SocketAddr = config.logic.rpc_bind.parse()?;
    let endpoint = args.endpoint.unwrap_or_else(|| format!("http://{rpc_addr}"));
    let registration = registry
        .register(
            "logic",
            &ServiceInstance {
                instance_id: instance_id.clone(),
                endpoint,
                metadata: serde_json::json!({}),
            },
            Duration::from_secs(config.registry.lease_ttl_secs.max(1) as u64),
        )
        .await?;

    {
        let shutdown = shutdown.clone();
        let mut registry_lost = registration.lost.clone();
        let mut worker_lost = lease.lost.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = resonance_common::shutdown::signal_received() => {},
                _ = registry_lost.changed() => tracing::error!("logic: registry lease lost"),
                _ = worker_lost.changed() => tracing::error!("logic: worker id lease lost"),
            }
            shutdown.cancel();
        });
    }

    tracing::info!(instance_id = %instance_id, rpc_addr = %rpc_addr, "logic starting");

    let rpc_shutdown = shutdown.clone();
    let rpc_res = Server::builder()
        .add_service(AuthServiceServer::new(auth_service))
        .add_service(SessionServiceServer::new(session_service))
        .add_service(LogicStreamServiceServer::new(stream_service))
        .serve_with_shutdown(rpc_addr, async move { rpc_shutdown.cancelled().await })
        .await;
    if let Err(e) = rpc_res {
        tracing::error!(error = %e, "rpc server exited");
    }

    tracing::info!("logic: rpc server stopped, closing outbox relay, registry and storage handles");
    let _ = tokio::time::timeout(resonance_common::shutdown::SHUTDOWN_BUDGET, async {
        shutdown.cancel();
        let _ = relay_handle.await;
        registration.close();
        drop(close_kv);
        close_pool.close().await;
    })
    .await;

    Ok(())
}

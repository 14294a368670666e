use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Server};
use tracing_subscriber::EnvFilter;

use resonance_auth::TokenValidator;
use resonance_config::{ResonanceConfig, discover_and_load};
use resonance_gateway::{
    push_service::PushServiceImpl,
    rpc::{chat_stream::ChatStreamClient, presence_stream::PresenceStreamClient},
    server,
    state::GatewayState,
};
use resonance_kv::{KvClient, worker_id};
use resonance_proto::{auth_service_client::AuthServiceClient, logic_stream_service_client::LogicStreamServiceClient, push_service_server::PushServiceServer};
use resonance_registry::{Registry, ServiceInstance};

#[derive(Parser, Debug)]
#[command(name = "resonance-gateway")]
struct Args {
    /// Address Task/Logic reach this gateway's Push RPC on, advertised to the registry.
    #[arg(long, env = "RESONANCE_GATEWAY_PUSH_ENDPOINT")]
    push_endpoint: String,

    /// Endpoint of the Logic gRPC service.
    #[arg(long, env = "RESONANCE_LOGIC_ENDPOINT", default_value = "http://127.0.0.1:9090")]
    logic_endpoint: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let args = Args::parse();
    let config: ResonanceConfig = discover_and_load();
    let gateway_id = uuid::Uuid::new_v4().to_string();

    if config.gateway.metrics_bind.is_empty() {
        tracing::info!("gateway: metrics exporter disabled (empty bind address)");
    } else {
        resonance_common::metrics::install(&config.gateway.metrics_bind)?;
    }

    let kv = KvClient::connect(&config.kv.url).await?;
    let lease = worker_id::acquire(kv.clone(), &config.kv.worker_id_prefix_for("gateway"), config.kv.worker_id_lease()).await?;
    tracing::info!(worker_id = lease.worker_id, "gateway: worker id leased");

    let logic_channel = Channel::from_shared(args.logic_endpoint.clone())?.connect_lazy();
    let auth_client = AuthServiceClient::new(logic_channel.clone());
    let logic_stream_client = LogicStreamServiceClient::new(logic_channel.clone());

    let validator = TokenValidator::new(
        auth_client,
        config.auth.token_cache_ttl(),
        config.auth.token_cache_max_entries,
    );
    let chat_stream = ChatStreamClient::new(logic_stream_client.clone());
    let presence_stream = PresenceStreamClient::new(logic_stream_client, gateway_id.clone());

    let shutdown = CancellationToken::new();
    let state = GatewayState::new(
        gateway_id.clone(),
        config.gateway.clone(),
        validator,
        chat_stream,
        presence_stream,
        shutdown.clone(),
    );

    let registry = Registry::connect(&config.registry.endpoints, config.registry.namespace.clone()).await?;
    let registration = registry
        .register(
            "gateway",
            &ServiceInstance {
                instance_id: gateway_id.clone(),
                endpoint: args.push_endpoint.clone(),
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
                _ = registry_lost.changed() => tracing::error!("gateway: registry lease lost"),
                _ = worker_lost.changed() => tracing::error!("gateway: worker id lease lost"),
            }
            shutdown.cancel();
        });
    }

    let http_addr: SocketAddr = config.gateway.bind.parse()?;
    let push_addr: SocketAddr = args.push_endpoint.parse().unwrap_or_else(|_| {
        tracing::warn!(endpoint = %args.push_endpoint, "push endpoint is not a bindable address, falling back to 0.0.0.0:9190");
        "0.0.0.0:9190".parse().expect("fallback address is valid")
    });

    let app_state = server::AppState {
        gateway: Arc::clone(&state),
        kv: kv.clone(),
        registry: registry.clone(),
    };
    let http_shutdown = shutdown.clone();
    let http_server = async move {
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        axum::serve(
            listener,
            server::router(app_state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
        .await
        .map_err(anyhow::Error::from)
    };

    let push_service = PushServiceImpl::new(Arc::clone(&state));
    let push_shutdown = shutdown.clone();
    let push_server = Server::builder()
        .add_service(PushServiceServer::new(push_service))
        .serve_with_shutdown(push_addr, async move { push_shutdown.cancelled().await });

    tracing::info!(gateway_id = %gateway_id, http_addr = %http_addr, push_addr = %push_addr, "gateway starting");

    let (http_res, push_res) = tokio::join!(http_server, push_server);
    if let Err(e) = http_res {
        tracing::error!(error = %e, "http server exited");
    }
    if let Err(e) = push_res {
        tracing::error!(error = %e, "push server exited");
    }

    tracing::info!("gateway: servers stopped, closing registry and storage handles");
    let _ = tokio::time::timeout(resonance_common::shutdown::SHUTDOWN_BUDGET, async {
        registration.close();
        drop(kv);
    })
    .await;

    Ok(())
}

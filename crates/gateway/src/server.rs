use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use resonance_kv::KvClient;
use resonance_registry::Registry;

use crate::{state::GatewayState, ws::handle_connection};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
    pub kv: KvClient,
    pub registry: Registry,
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Builds the gateway's HTTP surface: the WebSocket upgrade endpoint and a
/// health probe that checks actual KV/registry reachability, not just that
/// the process is running.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let count = state.gateway.client_count().await;

    let kv_ok = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, state.kv.ping()).await.is_ok_and(|r| r.is_ok());
    let registry_ok = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, state.registry.list("gateway")).await.is_ok_and(|r| r.is_ok());

    let status = if kv_ok && registry_ok { "ok" } else { "degraded" };
    let code = if kv_ok && registry_ok {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "gatewayId": state.gateway.gateway_id,
            "connections": count,
            "kv": kv_ok,
            "registry": registry_ok,
        })),
    )
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: axum::http::HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = bearer_token(&headers).or(query.token);
    let Some(token) = token else {
        warn!(remote = %addr, "ws: upgrade rejected, no bearer token");
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state.gateway, addr, token))
        .into_response()
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

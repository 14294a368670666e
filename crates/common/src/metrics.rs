//! Prometheus metrics exporter setup, shared by all three binaries so each
//! one spawns the same kind of scrape endpoint instead of reinventing it.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Installs the global metrics recorder and starts its scrape HTTP server on
/// `bind`. Call once near the top of `main`, before anything records a metric.
pub fn install(bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind.parse()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!(%addr, "metrics: prometheus exporter listening");
    Ok(())
}

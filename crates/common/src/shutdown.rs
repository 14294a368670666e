//! Shared shutdown-signal waiting, used by every binary's main so the
//! "Ctrl+C or SIGTERM" half of graceful shutdown isn't reimplemented three
//! times. Ordering the actual teardown (consumers, then queues, then
//! registry, then storage handles) stays in each binary, since what needs
//! closing differs per service.

use std::time::Duration;

use tracing::info;

/// Bounds how long a binary's ordered teardown gets before it gives up and
/// exits anyway.
pub const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

/// Resolves on Ctrl+C or SIGTERM, whichever comes first.
pub async fn signal_received() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("shutdown: ctrl-c received"),
        () = terminate => info!("shutdown: sigterm received"),
    }
}

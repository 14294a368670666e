use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use resonance_bus::BusPublisher;
use resonance_protocol::FanOutEvent;
use resonance_storage::outbox;

/// Background relay, per spec §4.4: every tick, claim up to `batch_size` due
/// rows and publish each to the bus. A publish failure reschedules the row
/// with quadratic backoff instead of retrying in a tight loop.
///
/// Each tick runs in its own spawned task rather than in-process, so a panic
/// inside `relay_tick` is caught as a `JoinError` and logged instead of
/// killing this loop — the next tick starts a fresh task regardless.
pub async fn run(pool: PgPool, publisher: BusPublisher, tick: Duration, batch_size: i64, max_retries: i32, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(tick);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("outbox relay: shutdown requested, stopping");
                break;
            },
            _ = ticker.tick() => {
                let tick_pool = pool.clone();
                let tick_publisher = publisher.clone();
                let handle = tokio::spawn(async move {
                    relay_tick(&tick_pool, &tick_publisher, batch_size, max_retries).await
                });
                match handle.await {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => {
                        metrics::counter!("resonance_outbox_relay_tick_errors_total").increment(1);
                        error!(error = %e, "outbox relay: tick failed, continuing");
                    },
                    Err(join_err) => {
                        metrics::counter!("resonance_outbox_relay_tick_panics_total").increment(1);
                        error!(error = %join_err, "outbox relay: tick panicked, continuing");
                    },
                }
            },
        }
    }
}

async fn relay_tick(pool: &PgPool, publisher: &BusPublisher, batch_size: i64, max_retries: i32) -> anyhow::Result<()> {
    let rows = outbox::claim_batch(pool, batch_size).await?;
    for row in rows {
        let event: FanOutEvent = match serde_json::from_value(row.payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!(id = row.id, error = %e, "outbox relay: unparseable payload, marking sent to avoid poison-pill retry");
                outbox::mark_sent(pool, row.id).await?;
                continue;
            },
        };

        match publisher.publish(&event).await {
            Ok(()) => {
                outbox::mark_sent(pool, row.id).await?;
                metrics::counter!("resonance_outbox_relay_published_total").increment(1);
            },
            Err(e) => {
                warn!(id = row.id, msg_id = %row.msg_id, error = %e, "outbox relay: publish failed, scheduling retry");
                outbox::mark_retry(pool, row.id, max_retries).await?;
                metrics::counter!("resonance_outbox_relay_retry_scheduled_total").increment(1);
            },
        }
    }
    Ok(())
}

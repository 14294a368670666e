//! Generic worker-pool mechanics shared by the storage and push consumers,
//! per spec §4.5.3: a fetch loop feeds a buffered `jobs` channel, a fixed
//! pool of workers drains it, each job is retried up to `max_retry` times
//! before the message is finally `Nak`ed.

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use resonance_bus::{BusConsumer, BusMessage};
use resonance_protocol::FanOutEvent;

#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &FanOutEvent) -> anyhow::Result<()>;
}

pub struct ConsumerPool<H: EventHandler> {
    name: String,
    consumer: BusConsumer,
    handler: Arc<H>,
    worker_count: usize,
    fetch_batch: usize,
    max_retry: u32,
    retry_interval: Duration,
}

impl<H: EventHandler> ConsumerPool<H> {
    pub fn new(
        name: impl Into<String>,
        consumer: BusConsumer,
        handler: Arc<H>,
        worker_count: usize,
        fetch_batch: usize,
        max_retry: u32,
        retry_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            consumer,
            handler,
            worker_count,
            fetch_batch,
            max_retry,
            retry_interval,
        }
    }

    /// Runs until `shutdown` is cancelled: a fetch loop pushes pulled
    /// messages into a bounded channel; `worker_count` tasks share the
    /// receiver and process jobs. On shutdown the fetch loop stops first,
    /// then the channel is closed and every in-flight job is allowed to
    /// finish before this returns — the "stop consumers" step of the
    /// binary's teardown sequence.
    pub async fn run(self, shutdown: CancellationToken) {
        let (tx, rx) = tokio::sync::mpsc::channel::<BusMessage>(self.fetch_batch * 2);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&self.handler);
            let name = self.name.clone();
            let max_retry = self.max_retry;
            let retry_interval = self.retry_interval;
            workers.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(message) = job else { break };
                    process_job(&name, worker_id, &*handler, &message, max_retry, retry_interval).await;
                }
            }));
        }

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                res = self.consumer.fetch(self.fetch_batch) => {
                    match res {
                        Ok(messages) => {
                            for message in messages {
                                if tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                        },
                        Err(e) => {
                            warn!(consumer = %self.name, error = %e, "fetch failed, backing off");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        },
                    }
                },
            }
        }

        drop(tx);
        for worker in workers {
            let _ = worker.await;
        }
        info!(consumer = %self.name, "consumer pool stopped");
    }
}

async fn process_job<H: EventHandler>(
    name: &str,
    worker_id: usize,
    handler: &H,
    message: &BusMessage,
    max_retry: u32,
    retry_interval: Duration,
) {
    let event = match message.parse() {
        Ok(event) => event,
        Err(e) => {
            warn!(consumer = name, worker_id, error = %e, "unparseable payload, terminating it (will never parse on redelivery)");
            let _ = message.term().await;
            metrics::counter!("resonance_consumer_jobs_terminated_total", "consumer" => name.to_string()).increment(1);
            return;
        },
    };

    let mut attempt = 0;
    loop {
        match handler.handle(&event).await {
            Ok(()) => {
                if let Err(e) = message.ack().await {
                    warn!(consumer = name, worker_id, msg_id = %event.msg_id, error = %e, "ack failed");
                }
                metrics::counter!("resonance_consumer_jobs_processed_total", "consumer" => name.to_string()).increment(1);
                return;
            },
            Err(e) if attempt < max_retry => {
                attempt += 1;
                debug!(consumer = name, worker_id, msg_id = %event.msg_id, attempt, error = %e, "retrying");
                metrics::counter!("resonance_consumer_jobs_retried_total", "consumer" => name.to_string()).increment(1);
                tokio::time::sleep(retry_interval).await;
            },
            Err(e) => {
                warn!(consumer = name, worker_id, msg_id = %event.msg_id, error = %e, "giving up, nacking for redelivery");
                let _ = message.nak().await;
                metrics::counter!("resonance_consumer_jobs_nacked_total", "consumer" => name.to_string()).increment(1);
                return;
            },
        }
    }
}

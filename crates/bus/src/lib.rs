//! NATS JetStream pub/sub bus for the fan-out event topic.
//!
//! One stream (`RESONANCE_PUSH`) carries the single subject
//! `resonance.push.event.v1`. Storage and push are independent durable pull
//! consumers against that one stream/subject; each is its own queue group
//! because a durable consumer's pulls are inherently load-balanced across
//! however many process instances are fetching from it concurrently.

mod consumer;
mod error;
mod publisher;

pub use consumer::{BusConsumer, BusMessage};
pub use error::{Error, Result};
pub use publisher::BusPublisher;

use async_nats::jetstream::{self, stream::Config as StreamConfig};

/// Connect to NATS, enable JetStream, and ensure the push stream exists.
pub async fn connect(url: &str, stream_name: &str, subject: &str) -> Result<jetstream::Context> {
    let client = async_nats::connect(url).await?;
    let js = jetstream::new(client);
    ensure_stream(&js, stream_name, subject).await?;
    Ok(js)
}

async fn ensure_stream(js: &jetstream::Context, stream_name: &str, subject: &str) -> Result<()> {
    let config = StreamConfig {
        name: stream_name.to_string(),
        subjects: vec![subject.to_string()],
        max_age: std::time::Duration::from_secs(7 * 24 * 60 * 60),
        duplicate_window: std::time::Duration::from_secs(120),
        ..Default::default()
    };

    match js.get_stream(stream_name).await {
        Ok(_) => {
            js.update_stream(config).await?;
        },
        Err(_) => {
            js.create_stream(config).await?;
        },
    }
    Ok(())
}

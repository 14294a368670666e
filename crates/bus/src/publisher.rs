use async_nats::jetstream::Context as JetStreamContext;
use resonance_protocol::FanOutEvent;

use crate::Result;

/// Publishes fan-out events to the push subject with idempotency keyed on
/// `msg_id`, so a retried publish (outbox relay re-attempt after a prior
/// timeout) never produces a duplicate delivery.
#[derive(Clone)]
pub struct BusPublisher {
    js: JetStreamContext,
    subject: String,
}

impl BusPublisher {
    #[must_use]
    pub fn new(js: JetStreamContext, subject: impl Into<String>) -> Self {
        Self {
            js,
            subject: subject.into(),
        }
    }

    pub async fn publish(&self, event: &FanOutEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", event.msg_id.as_str());

        let ack = self
            .js
            .publish_with_headers(self.subject.clone(), headers, payload.into())
            .await?;
        ack.await?;
        Ok(())
    }
}

use async_nats::jetstream::{
    self,
    consumer::pull::Config as PullConsumerConfig,
    consumer::{AckPolicy, DeliverPolicy},
    AckKind,
};
use futures::StreamExt;
use resonance_protocol::FanOutEvent;

use crate::Result;

/// A durable pull consumer bound to the push stream/subject. Multiple
/// process instances binding the same `consumer_name` form one queue group:
/// JetStream hands each pulled message to exactly one fetcher.
pub struct BusConsumer {
    consumer: jetstream::consumer::Consumer<PullConsumerConfig>,
}

impl BusConsumer {
    pub async fn bind(
        js: &jetstream::Context,
        stream_name: &str,
        consumer_name: &str,
        subject: &str,
    ) -> Result<Self> {
        let stream = js.get_stream(stream_name).await?;
        let config = PullConsumerConfig {
            durable_name: Some(consumer_name.to_string()),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::All,
            filter_subject: subject.to_string(),
            ..Default::default()
        };
        let consumer = stream.get_or_create_consumer(consumer_name, config).await?;
        Ok(Self { consumer })
    }

    /// Pull up to `batch_size` messages. Each is handed to the caller
    /// undecoded — `BusMessage::parse` defers deserialization so a caller
    /// that finds a payload unparseable can `term()` it without having
    /// fetched or acked anything first.
    pub async fn fetch(&self, batch_size: usize) -> Result<Vec<BusMessage>> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(batch_size)
            .messages()
            .await?;

        let mut out = Vec::with_capacity(batch_size);
        while let Some(msg) = messages.next().await {
            let msg = msg?;
            out.push(BusMessage { inner: msg });
        }
        Ok(out)
    }
}

pub struct BusMessage {
    inner: jetstream::Message,
}

impl BusMessage {
    pub fn parse(&self) -> std::result::Result<FanOutEvent, serde_json::Error> {
        serde_json::from_slice(&self.inner.payload)
    }

    pub async fn ack(&self) -> Result<()> {
        self.inner.ack().await.map_err(Into::into)
    }

    pub async fn nak(&self) -> Result<()> {
        self.inner
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(Into::into)
    }

    pub async fn term(&self) -> Result<()> {
        self.inner.ack_with(AckKind::Term).await.map_err(Into::into)
    }
}

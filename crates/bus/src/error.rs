use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("nats connect failed: {0}")]
    Connect(#[from] async_nats::ConnectError),

    #[error("jetstream error: {0}")]
    JetStream(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<async_nats::jetstream::context::CreateStreamError> for Error {
    fn from(e: async_nats::jetstream::context::CreateStreamError) -> Self {
        Self::JetStream(e.to_string())
    }
}

impl From<async_nats::jetstream::context::UpdateStreamError> for Error {
    fn from(e: async_nats::jetstream::context::UpdateStreamError) -> Self {
        Self::JetStream(e.to_string())
    }
}

impl From<async_nats::jetstream::stream::ConsumerError> for Error {
    fn from(e: async_nats::jetstream::stream::ConsumerError) -> Self {
        Self::JetStream(e.to_string())
    }
}

impl From<async_nats::jetstream::consumer::pull::MessagesError> for Error {
    fn from(e: async_nats::jetstream::consumer::pull::MessagesError) -> Self {
        Self::JetStream(e.to_string())
    }
}

impl From<async_nats::Error> for Error {
    fn from(e: async_nats::Error) -> Self {
        Self::JetStream(e.to_string())
    }
}

impl From<async_nats::jetstream::context::PublishError> for Error {
    fn from(e: async_nats::jetstream::context::PublishError) -> Self {
        Self::JetStream(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

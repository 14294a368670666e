use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("worker id pool exhausted in namespace {0}")]
    WorkerIdPoolExhausted(String),

    #[error("worker id lease lost: {0}")]
    LeaseLost(String),
}

pub type Result<T> = std::result::Result<T, Error>;

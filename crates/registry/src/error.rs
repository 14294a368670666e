use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Etcd(#[from] etcd_client::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("lease lost for {0}")]
    LeaseLost(String),
}

pub type Result<T> = std::result::Result<T, Error>;

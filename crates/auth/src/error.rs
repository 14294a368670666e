use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("token is invalid or expired")]
    Invalid,

    #[error(transparent)]
    Rpc(#[from] tonic::Status),
}

pub type Result<T> = std::result::Result<T, Error>;

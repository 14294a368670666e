use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("session {0} is full: CAS update affected 0 rows")]
    SeqCasConflict(String),

    #[error("not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, Error>;

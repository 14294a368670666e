//! Logic: message ingestion and sequencing, session/history queries, auth,
//! and the outbox relay that bridges Postgres to the bus.

pub mod auth_service;
pub mod error;
pub mod ingest;
pub mod outbox_relay;
pub mod session_service;
pub mod stream_service;

pub use error::{Error, Result};

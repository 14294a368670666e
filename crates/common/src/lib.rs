//! Shared types, error definitions, and utilities used across all resonance crates.

pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod ts;

pub use error::{Error, FromMessage, Result, ResonanceError};

//! Bearer-token validation with a short-TTL cache in front of Logic's
//! `AuthService.ValidateToken`, so the Gateway validates a token once per
//! cache window instead of once per request.

pub mod cache;
pub mod error;
pub mod validator;

pub use {
    cache::TokenCache,
    error::{Error, Result},
    validator::TokenValidator,
};

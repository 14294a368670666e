use std::sync::Arc;

use resonance_proto::{auth_service_client::AuthServiceClient, ValidateTokenRequest};
use tonic::transport::Channel;
use tracing::debug;

use crate::{Error, Result, cache::TokenCache};

/// Resolves bearer tokens to usernames, consulting the cache before ever
/// making a `ValidateToken` RPC to Logic — the single-validation contract
/// from the token-validation-caching design note.
pub struct TokenValidator {
    cache: TokenCache,
    client: AuthServiceClient<Channel>,
}

impl TokenValidator {
    pub fn new(client: AuthServiceClient<Channel>, ttl: std::time::Duration, max_entries: usize) -> Arc<Self> {
        Arc::new(Self {
            cache: TokenCache::new(ttl, max_entries),
            client,
        })
    }

    pub async fn validate(&self, token: &str) -> Result<String> {
        if let Some(username) = self.cache.get(token) {
            debug!(token_cache = "hit");
            return Ok(username);
        }

        let mut client = self.client.clone();
        let reply = client
            .validate_token(ValidateTokenRequest { token: token.to_string() })
            .await?
            .into_inner();

        if !reply.valid {
            return Err(Error::Invalid);
        }

        self.cache.insert(token.to_string(), reply.username.clone());
        Ok(reply.username)
    }

    /// Drop a token from the cache, e.g. on logout, so a later request with
    /// the same (now-revoked) token is forced back through Logic.
    pub fn invalidate(&self, token: &str) {
        self.cache.invalidate(token);
    }
}

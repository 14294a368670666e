use std::time::Duration;

use base64::Engine;
use rand::RngCore;
use sqlx::PgPool;
use tonic::{Request, Response, Status};

use resonance_kv::{KvClient, session_token};
use resonance_proto::{
    AuthReply, HealthCheckReply, HealthCheckRequest, LoginRequest, RegisterRequest, User,
    ValidateTokenReply, ValidateTokenRequest, auth_service_server::AuthService,
};
use resonance_storage::users;

use crate::Error;

/// Opaque bearer tokens, minted here and resolved against Redis — see
/// `resonance_kv::session_token` for the store itself.
pub struct AuthServiceImpl {
    pub pool: PgPool,
    pub kv: KvClient,
    pub token_ttl: Duration,
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn login(&self, request: Request<LoginRequest>) -> Result<Response<AuthReply>, Status> {
        let req = request.into_inner();
        if !users::verify_password(&self.pool, &req.username, &req.password).await.map_err(Error::from)? {
            return Err(Error::InvalidCredentials.into());
        }
        let user = users::find_by_username(&self.pool, &req.username)
            .await
            .map_err(Error::from)?
            .ok_or(Error::InvalidCredentials)?;

        let token = generate_token();
        session_token::issue(&self.kv, &token, &user.username, self.token_ttl.as_secs())
            .await
            .map_err(Error::from)?;

        Ok(Response::new(AuthReply {
            access_token: token,
            user: Some(User {
                username: user.username,
                display_name: user.display_name,
                avatar_url: user.avatar_url,
            }),
        }))
    }

    async fn register(&self, request: Request<RegisterRequest>) -> Result<Response<AuthReply>, Status> {
        let req = request.into_inner();
        if users::find_by_username(&self.pool, &req.username).await.map_err(Error::from)?.is_some() {
            return Err(Error::UsernameTaken.into());
        }
        let user = users::create(&self.pool, &req.username, &req.password, &req.display_name)
            .await
            .map_err(Error::from)?;

        let token = generate_token();
        session_token::issue(&self.kv, &token, &user.username, self.token_ttl.as_secs())
            .await
            .map_err(Error::from)?;

        Ok(Response::new(AuthReply {
            access_token: token,
            user: Some(User {
                username: user.username,
                display_name: user.display_name,
                avatar_url: user.avatar_url,
            }),
        }))
    }

    async fn validate_token(&self, request: Request<ValidateTokenRequest>) -> Result<Response<ValidateTokenReply>, Status> {
        let req = request.into_inner();
        let username = session_token::resolve(&self.kv, &req.token).await.map_err(Error::from)?;
        Ok(Response::new(match username {
            Some(username) => ValidateTokenReply { valid: true, username },
            None => ValidateTokenReply { valid: false, username: String::new() },
        }))
    }

    async fn health_check(&self, _request: Request<HealthCheckRequest>) -> Result<Response<HealthCheckReply>, Status> {
        Ok(Response::new(HealthCheckReply { ok: true, detail: String::new() }))
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}

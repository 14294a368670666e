use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;

use crate::{
    Error, Result,
    models::User,
};

pub async fn create(pool: &PgPool, username: &str, password: &str, display_name: &str) -> Result<User> {
    let hash = hash_password(password)?;
    sqlx::query(
        "INSERT INTO users (username, password_hash, display_name) VALUES ($1, $2, $3)",
    )
    .bind(username)
    .bind(&hash)
    .bind(display_name)
    .execute(pool)
    .await?;

    Ok(User {
        username: username.to_string(),
        password_hash: hash,
        display_name: display_name.to_string(),
        avatar_url: String::new(),
    })
}

pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Verify a plaintext password against `username`'s stored hash. Returns
/// `false` both for a wrong password and for a nonexistent user, so callers
/// cannot distinguish the two from the return value alone (see login RPC).
pub async fn verify_password(pool: &PgPool, username: &str, password: &str) -> Result<bool> {
    let Some(user) = find_by_username(pool, username).await? else {
        return Ok(false);
    };
    Ok(verify_password_hash(password, &user.password_hash))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Hash(e.to_string()))
}

fn verify_password_hash(password: &str, hash_str: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash_str) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

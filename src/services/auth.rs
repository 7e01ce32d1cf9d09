//! Пароли (bcrypt) и JWT-токены доступа/обновления.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;
use crate::models::User;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("wrong token type: expected {expected:?}")]
    WrongTokenType { expected: TokenType },

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

// bcrypt - CPU-bound, уводим с async-потоков
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(ok)
}

pub fn issue_token(config: &JwtConfig, user_id: i64, token_type: TokenType) -> Result<String, AuthError> {
    let now = Utc::now();
    let ttl = match token_type {
        TokenType::Access => Duration::minutes(config.access_ttl_minutes),
        TokenType::Refresh => Duration::hours(config.refresh_ttl_hours),
    };
    let claims = Claims {
        user_id,
        token_type,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn issue_pair(config: &JwtConfig, user: &User) -> Result<TokenPair, AuthError> {
    Ok(TokenPair {
        access: issue_token(config, user.id, TokenType::Access)?,
        refresh: issue_token(config, user.id, TokenType::Refresh)?,
    })
}

/// Проверяет подпись, срок и тип токена.
pub fn decode_token(config: &JwtConfig, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    if data.claims.token_type != expected {
        return Err(AuthError::WrongTokenType { expected });
    }
    Ok(data.claims)
}

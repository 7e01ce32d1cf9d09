use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::services::auth::{self, TokenType};
use crate::store::{StoreError, StoreResult};
use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub is_staff: bool,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            is_staff: user.is_staff,
        }
    }
}

/// Пользователь с ролью администратора: 401 без аутентификации, 403 без is_staff.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// Email хранится обрезанным и в нижнем регистре.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Проверка email + пароль. Неверная пара или неактивный пользователь - 401.
pub async fn check_credentials(state: &AppState, email: &str, password: &str) -> ApiResult<User> {
    let user = state
        .store
        .find_user_by_email(&normalize_email(email))
        .await?
        .filter(|u| u.is_active)
        .ok_or(ApiError::Unauthorized)?;

    let valid = auth::verify_password(password, &user.password_hash)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !valid {
        return Err(ApiError::Unauthorized);
    }
    Ok(user)
}

async fn bearer_user(state: &AppState, token: &str) -> ApiResult<User> {
    let claims = auth::decode_token(&state.config.jwt, token, TokenType::Access).map_err(|e| {
        debug!("rejected bearer token: {}", e);
        ApiError::Unauthorized
    })?;
    token_user(state.store.get_user(claims.user_id).await)
}

/// Владелец токена: удалён или неактивен - 401, сбой хранилища - как есть (500).
pub fn token_user(lookup: StoreResult<User>) -> ApiResult<User> {
    match lookup {
        Ok(user) if user.is_active => Ok(user),
        Ok(_) | Err(StoreError::NotFound) => Err(ApiError::Unauthorized),
        Err(e) => Err(e.into()),
    }
}

async fn basic_user(state: &AppState, encoded: &str) -> ApiResult<User> {
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::Unauthorized)?;
    let credentials = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;

    // email:password
    let (email, password) = credentials.split_once(':').ok_or(ApiError::Unauthorized)?;
    check_credentials(state, email, password).await
}

// Bearer (JWT access) или Basic
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let user = if let Some(token) = auth_header.strip_prefix("Bearer ") {
            bearer_user(state, token.trim()).await?
        } else if let Some(encoded) = auth_header.strip_prefix("Basic ") {
            basic_user(state, encoded.trim()).await?
        } else {
            return Err(ApiError::Unauthorized);
        };

        if !user.is_active {
            return Err(ApiError::Unauthorized);
        }
        Ok(AuthUser::from(&user))
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            debug!("user {} is not staff", user.id);
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

/// JSON тело + `validator::Validate`. Битый JSON и нарушения правил - 400.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

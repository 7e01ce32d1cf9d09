use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};
use validator::{Validate, ValidateEmail, ValidationError};

use crate::error::{ApiError, ApiResult};
use crate::middleware::{check_credentials, normalize_email, token_user, AuthUser, ValidJson};
use crate::models::{NewUser, User, UserUpdate};
use crate::services::auth::{self, TokenType};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(obtain_token))
        .route("/token/refresh", post(refresh_token))
        .route("/me", get(me).patch(update_me))
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
        }
    }
}

// Проверяется то, что будет сохранено: без пробелов по краям
fn valid_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().validate_email() {
        Ok(())
    } else {
        Err(ValidationError::new("email").with_message(Cow::Borrowed("Enter a valid email address.")))
    }
}

fn internal(e: auth::AuthError) -> ApiError {
    ApiError::Internal(e.to_string())
}

// POST /api/user/register
#[derive(Debug, Deserialize, Validate)]
struct RegisterRequest {
    #[validate(custom(function = "valid_email"))]
    email: String,
    #[validate(length(min = 5, message = "Ensure this field has at least 5 characters."))]
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let password_hash = auth::hash_password(&req.password, state.config.auth.bcrypt_cost)
        .await
        .map_err(internal)?;

    let user = state
        .store
        .create_user(NewUser {
            email: normalize_email(&req.email),
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            is_staff: false,
        })
        .await?;
    info!("User {} registered", user.id);
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

// POST /api/user/token
#[derive(Debug, Deserialize, Validate)]
struct TokenRequest {
    email: String,
    password: String,
}

async fn obtain_token(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<TokenRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = check_credentials(&state, &req.email, &req.password).await?;
    let pair = auth::issue_pair(&state.config.jwt, &user).map_err(internal)?;
    debug!("Issued token pair for user {}", user.id);
    Ok(Json(pair))
}

// POST /api/user/token/refresh
#[derive(Debug, Deserialize, Validate)]
struct RefreshRequest {
    refresh: String,
}

#[derive(Debug, Serialize)]
struct AccessResponse {
    access: String,
}

async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = auth::decode_token(&state.config.jwt, &req.refresh, TokenType::Refresh)
        .map_err(|e| {
            debug!("refresh rejected: {}", e);
            ApiError::Unauthorized
        })?;

    let user = token_user(state.store.get_user(claims.user_id).await)?;

    let access = auth::issue_token(&state.config.jwt, user.id, TokenType::Access).map_err(internal)?;
    Ok(Json(AccessResponse { access }))
}

// GET /api/user/me
async fn me(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    let user = state.store.get_user(user.id).await?;
    Ok(Json(UserResponse::from(user)))
}

// PATCH /api/user/me
#[derive(Debug, Deserialize, Validate)]
struct UpdateMeRequest {
    #[validate(custom(function = "valid_email"))]
    email: Option<String>,
    #[validate(length(min = 5, message = "Ensure this field has at least 5 characters."))]
    password: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidJson(req): ValidJson<UpdateMeRequest>,
) -> ApiResult<impl IntoResponse> {
    let password_hash = match req.password.as_deref() {
        Some(password) => Some(
            auth::hash_password(password, state.config.auth.bcrypt_cost)
                .await
                .map_err(internal)?,
        ),
        None => None,
    };

    let updated = state
        .store
        .update_user(
            user.id,
            UserUpdate {
                email: req.email.as_deref().map(normalize_email),
                password_hash,
                first_name: req.first_name,
                last_name: req.last_name,
            },
        )
        .await?;
    Ok(Json(UserResponse::from(updated)))
}

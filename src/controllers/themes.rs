use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::middleware::{AdminUser, AuthUser, ValidJson};
use crate::models::ShowTheme;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/show_themes", get(list_themes).post(create_theme))
}

// GET /api/planetarium/show_themes
async fn list_themes(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<ShowTheme>>> {
    Ok(Json(state.store.list_themes().await?))
}

// POST /api/planetarium/show_themes
#[derive(Debug, Deserialize, Validate)]
struct CreateThemeRequest {
    #[validate(length(max = 63, message = "Ensure this field has no more than 63 characters."))]
    name: String,
}

async fn create_theme(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<CreateThemeRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::from(FieldErrors::single("name", "This field may not be blank.")));
    }

    let theme = state.store.create_theme(name).await?;
    tracing::info!("show theme {} '{}' created", theme.id, theme.name);
    Ok((StatusCode::CREATED, Json(theme)))
}

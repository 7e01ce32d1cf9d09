use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::middleware::{AdminUser, AuthUser, ValidJson};
use crate::models::{NewPlanetariumDome, PlanetariumDome};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/planetarium_dome", get(list_domes).post(create_dome))
}

#[derive(Debug, Serialize)]
pub struct DomeResponse {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
    pub capacity: i32,
}

impl From<&PlanetariumDome> for DomeResponse {
    fn from(dome: &PlanetariumDome) -> Self {
        Self {
            id: dome.id,
            name: dome.name.clone(),
            rows: dome.rows,
            seats_in_row: dome.seats_in_row,
            capacity: dome.capacity(),
        }
    }
}

// GET /api/planetarium/planetarium_dome
async fn list_domes(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<DomeResponse>>> {
    let domes = state.store.list_domes().await?;
    Ok(Json(domes.iter().map(DomeResponse::from).collect()))
}

// POST /api/planetarium/planetarium_dome
#[derive(Debug, Deserialize, Validate)]
struct CreateDomeRequest {
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    name: String,
    #[validate(range(min = 1, max = 1000, message = "Ensure this value is between 1 and 1000."))]
    rows: i32,
    #[validate(range(min = 1, max = 1000, message = "Ensure this value is between 1 and 1000."))]
    seats_in_row: i32,
}

async fn create_dome(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<CreateDomeRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::from(FieldErrors::single("name", "This field may not be blank.")));
    }

    let dome = state
        .store
        .create_dome(NewPlanetariumDome {
            name: name.to_string(),
            rows: req.rows,
            seats_in_row: req.seats_in_row,
        })
        .await?;
    tracing::info!("planetarium dome {} created with capacity {}", dome.id, dome.capacity());
    Ok((StatusCode::CREATED, Json(DomeResponse::from(&dome))))
}

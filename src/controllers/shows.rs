use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::middleware::{AdminUser, AuthUser, ValidJson};
use crate::models::{AstronomyShowRecord, NewAstronomyShow, ShowFilter, ShowTheme};
use crate::services::media::{MediaError, MediaStorage, INVALID_IMAGE};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/astronomy_show", get(list_shows).post(create_show))
        .route("/astronomy_show/{id}", get(retrieve_show))
        .route("/astronomy_show/{id}/upload-image", post(upload_image))
}

/* ---------- helpers ---------- */

/// `"1, 2,5"` -> `[1, 2, 5]`. Пустая строка - фильтра нет.
pub fn parse_ids(raw: &str) -> ApiResult<Option<Vec<i64>>> {
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return Ok(None);
    }
    parts
        .into_iter()
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ApiError::BadRequest(format!("show_theme: '{s}' is not a valid id")))
        })
        .collect::<ApiResult<Vec<i64>>>()
        .map(Some)
}

#[derive(Debug, Serialize)]
pub struct ShowListItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub show_theme: Vec<String>,
    pub image: Option<String>,
}

impl ShowListItem {
    pub fn new(record: &AstronomyShowRecord, media: &MediaStorage) -> Self {
        Self {
            id: record.show.id,
            title: record.show.title.clone(),
            description: record.show.description.clone(),
            show_theme: record.themes.iter().map(|t| t.name.clone()).collect(),
            image: record.show.image.as_deref().map(|path| media.url(path)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ShowDetail {
    id: i64,
    title: String,
    description: String,
    show_theme: Vec<ShowTheme>,
    image: Option<String>,
}

impl ShowDetail {
    fn new(record: AstronomyShowRecord, media: &MediaStorage) -> Self {
        Self {
            image: record.show.image.as_deref().map(|path| media.url(path)),
            id: record.show.id,
            title: record.show.title,
            description: record.show.description,
            show_theme: record.themes,
        }
    }
}

/* ---------- LIST / RETRIEVE ---------- */

// GET /api/planetarium/astronomy_show?title=...&show_theme=1,2
#[derive(Debug, Deserialize)]
struct ShowsQuery {
    title: Option<String>,
    show_theme: Option<String>,
}

async fn list_shows(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<ShowsQuery>,
) -> ApiResult<Json<Vec<ShowListItem>>> {
    let filter = ShowFilter {
        title: params
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        theme_ids: match params.show_theme.as_deref() {
            Some(raw) => parse_ids(raw)?,
            None => None,
        },
    };

    let shows = state.store.list_shows(&filter).await?;
    Ok(Json(
        shows
            .iter()
            .map(|record| ShowListItem::new(record, &state.media))
            .collect(),
    ))
}

// GET /api/planetarium/astronomy_show/{id}
async fn retrieve_show(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let record = state.store.get_show(id).await?;
    Ok(Json(ShowDetail::new(record, &state.media)))
}

/* ---------- CREATE ---------- */

// POST /api/planetarium/astronomy_show
#[derive(Debug, Deserialize, Validate)]
struct CreateShowRequest {
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    show_theme: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct CreateShowResponse {
    id: i64,
    title: String,
    description: String,
    show_theme: Vec<i64>,
}

async fn create_show(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<CreateShowRequest>,
) -> ApiResult<impl IntoResponse> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::from(FieldErrors::single("title", "This field may not be blank.")));
    }

    let record = state
        .store
        .create_show(NewAstronomyShow {
            title: title.to_string(),
            description: req.description,
            theme_ids: req.show_theme,
        })
        .await?;
    tracing::info!("astronomy show {} '{}' created", record.show.id, record.show.title);

    let response = CreateShowResponse {
        id: record.show.id,
        show_theme: record.themes.iter().map(|t| t.id).collect(),
        title: record.show.title,
        description: record.show.description,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/* ---------- IMAGE ---------- */

#[derive(Debug, Serialize)]
struct ImageResponse {
    id: i64,
    image: Option<String>,
}

// POST /api/planetarium/astronomy_show/{id}/upload-image (multipart, поле `image`)
async fn upload_image(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let record = state.store.get_show(id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            upload = Some(bytes);
            break;
        }
    }

    let Some(bytes) = upload else {
        return Err(ApiError::from(FieldErrors::single("image", "No file was submitted.")));
    };
    if bytes.is_empty() {
        return Err(ApiError::from(FieldErrors::single("image", "The submitted file is empty.")));
    }

    let relative = state
        .media
        .save_show_image(&record.show.title, &bytes)
        .await
        .map_err(|e| match e {
            MediaError::InvalidImage => ApiError::from(FieldErrors::single("image", INVALID_IMAGE)),
            MediaError::Io(e) => {
                tracing::error!("failed to store image for show {}: {:?}", id, e);
                ApiError::Internal(e.to_string())
            }
        })?;

    let show = state.store.set_show_image(id, &relative).await?;
    Ok((
        StatusCode::OK,
        Json(ImageResponse {
            id: show.id,
            image: show.image.as_deref().map(|path| state.media.url(path)),
        }),
    ))
}

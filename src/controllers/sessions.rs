use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::domes::DomeResponse;
use super::shows::ShowListItem;
use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::middleware::{AdminUser, AuthUser, ValidJson};
use crate::models::{NewShowSession, SessionFilter, ShowSession, ShowSessionSummary, TakenPlace};
use crate::services::media::MediaStorage;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/show_session", get(list_sessions).post(create_session))
        .route(
            "/show_session/{id}",
            get(retrieve_session)
                .put(replace_session)
                .patch(patch_session)
                .delete(delete_session),
        )
}

const SHOW_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const SHOW_TIME_ERROR: &str =
    "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]].";

/// Время сеанса хранится без зоны; смещение из RFC 3339 отбрасывается после перевода в UTC.
pub fn parse_show_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    SHOW_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

#[derive(Debug, Serialize)]
pub struct SessionListItem {
    pub id: i64,
    pub show_time: NaiveDateTime,
    pub astronomy_show_title: String,
    pub astronomy_show_image: Option<String>,
    pub planetarium_dome_name: String,
    pub planetarium_dome_capacity: i32,
    pub tickets_available: i32,
}

impl SessionListItem {
    pub fn new(summary: ShowSessionSummary, media: &MediaStorage) -> Self {
        Self {
            id: summary.id,
            show_time: summary.show_time,
            astronomy_show_image: summary.astronomy_show_image.as_deref().map(|p| media.url(p)),
            astronomy_show_title: summary.astronomy_show_title,
            planetarium_dome_name: summary.planetarium_dome_name,
            planetarium_dome_capacity: summary.planetarium_dome_capacity,
            tickets_available: summary.tickets_available,
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionDetail {
    id: i64,
    show_time: NaiveDateTime,
    astronomy_show: ShowListItem,
    planetarium_dome: DomeResponse,
    taken_places: Vec<TakenPlace>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    id: i64,
    show_time: NaiveDateTime,
    astronomy_show: i64,
    planetarium_dome: i64,
}

impl From<ShowSession> for SessionResponse {
    fn from(session: ShowSession) -> Self {
        Self {
            id: session.id,
            show_time: session.show_time,
            astronomy_show: session.astronomy_show_id,
            planetarium_dome: session.planetarium_dome_id,
        }
    }
}

/* ---------- LIST / RETRIEVE ---------- */

// GET /api/planetarium/show_session?date=2024-05-01&astronomy_show=3
#[derive(Debug, Deserialize)]
struct SessionsQuery {
    date: Option<String>,
    astronomy_show: Option<String>,
}

impl SessionsQuery {
    fn into_filter(self) -> ApiResult<SessionFilter> {
        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ApiError::BadRequest(format!("date: '{raw}' is not a valid YYYY-MM-DD date"))
            })?),
            None => None,
        };
        let astronomy_show_id = match self
            .astronomy_show
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                ApiError::BadRequest(format!("astronomy_show: '{raw}' is not a valid id"))
            })?),
            None => None,
        };
        Ok(SessionFilter { date, astronomy_show_id })
    }
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<SessionsQuery>,
) -> ApiResult<Json<Vec<SessionListItem>>> {
    let filter = params.into_filter()?;
    let sessions = state.store.list_sessions(filter).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|summary| SessionListItem::new(summary, &state.media))
            .collect(),
    ))
}

// GET /api/planetarium/show_session/{id}
async fn retrieve_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.store.get_session(id).await?;
    Ok(Json(SessionDetail {
        id: detail.session.id,
        show_time: detail.session.show_time,
        astronomy_show: ShowListItem::new(&detail.astronomy_show, &state.media),
        planetarium_dome: DomeResponse::from(&detail.planetarium_dome),
        taken_places: detail.taken_places,
    }))
}

/* ---------- WRITE ---------- */

/// Тело POST/PUT/PATCH. Для PATCH отсутствующие поля берутся из текущего сеанса.
#[derive(Debug, Deserialize, Validate)]
struct SessionRequest {
    show_time: Option<String>,
    astronomy_show: Option<i64>,
    planetarium_dome: Option<i64>,
}

impl SessionRequest {
    fn into_new(self, current: Option<&ShowSession>) -> ApiResult<NewShowSession> {
        let mut errors = FieldErrors::new();
        const REQUIRED: &str = "This field is required.";

        let show_time = match self.show_time.as_deref() {
            Some(raw) => parse_show_time(raw).or_else(|| {
                errors.add("show_time", SHOW_TIME_ERROR);
                None
            }),
            None => current.map(|s| s.show_time).or_else(|| {
                errors.add("show_time", REQUIRED);
                None
            }),
        };
        let astronomy_show_id = self
            .astronomy_show
            .or(current.map(|s| s.astronomy_show_id))
            .or_else(|| {
                errors.add("astronomy_show", REQUIRED);
                None
            });
        let planetarium_dome_id = self
            .planetarium_dome
            .or(current.map(|s| s.planetarium_dome_id))
            .or_else(|| {
                errors.add("planetarium_dome", REQUIRED);
                None
            });

        match (show_time, astronomy_show_id, planetarium_dome_id) {
            (Some(show_time), Some(astronomy_show_id), Some(planetarium_dome_id))
                if errors.is_empty() =>
            {
                Ok(NewShowSession {
                    astronomy_show_id,
                    planetarium_dome_id,
                    show_time,
                })
            }
            _ => Err(ApiError::from(errors)),
        }
    }
}

// POST /api/planetarium/show_session
async fn create_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<SessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let new_session = req.into_new(None)?;
    let session = state.store.create_session(new_session).await?;
    tracing::info!(
        "show session {} scheduled at {} in dome {}",
        session.id,
        session.show_time,
        session.planetarium_dome_id
    );
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

// PUT /api/planetarium/show_session/{id}
async fn replace_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    ValidJson(req): ValidJson<SessionRequest>,
) -> ApiResult<impl IntoResponse> {
    // 404 раньше, чем ошибки полей
    state.store.get_session(id).await?;
    let session = state.store.update_session(id, req.into_new(None)?).await?;
    Ok(Json(SessionResponse::from(session)))
}

// PATCH /api/planetarium/show_session/{id}
async fn patch_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    ValidJson(req): ValidJson<SessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let current = state.store.get_session(id).await?;
    let update = req.into_new(Some(&current.session))?;
    let session = state.store.update_session(id, update).await?;
    Ok(Json(SessionResponse::from(session)))
}

// DELETE /api/planetarium/show_session/{id}
async fn delete_session(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.delete_session(id).await?;
    tracing::info!("show session {} deleted by {}", id, admin.email);
    Ok(StatusCode::NO_CONTENT)
}

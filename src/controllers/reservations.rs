use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::sessions::SessionListItem;
use crate::config::PaginationConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthUser, ValidJson};
use crate::models::{NewTicket, ReservationListItem, Ticket};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/reservation", get(list_reservations).post(create_reservation))
}

/* ---------- pagination ---------- */

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<String>,
    page_size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageRequest {
    number: i64,
    size: i64,
}

impl PageRequest {
    /// Неверный `page_size` игнорируется, слишком большой урезается до максимума.
    /// Неверный `page` - 404, в том числе такой, что смещение не помещается в i64.
    fn parse(query: &PageQuery, config: &PaginationConfig) -> ApiResult<Self> {
        let size = query
            .page_size
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|size| *size > 0)
            .map(|size| size.min(i64::from(config.max_page_size)))
            .unwrap_or(i64::from(config.page_size));

        let number = match query.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|n| *n >= 1 && *n <= i64::MAX / size)
                .ok_or(ApiError::NotFound)?,
        };
        Ok(Self { number, size })
    }

    fn offset(&self) -> i64 {
        (self.number - 1) * self.size
    }

    /// Пустая первая страница допустима.
    fn page_count(&self, count: i64) -> i64 {
        ((count + self.size - 1) / self.size).max(1)
    }
}

#[derive(Debug, Serialize)]
struct Paginated<T> {
    count: i64,
    next: Option<i64>,
    previous: Option<i64>,
    results: Vec<T>,
}

/* ---------- LIST ---------- */

#[derive(Debug, Serialize)]
struct TicketListItem {
    id: i64,
    row: i32,
    seat: i32,
    show_session: SessionListItem,
}

#[derive(Debug, Serialize)]
struct ReservationResponse {
    id: i64,
    created_at: DateTime<Utc>,
    tickets: Vec<TicketListItem>,
}

impl ReservationResponse {
    fn new(item: ReservationListItem, state: &AppState) -> Self {
        Self {
            id: item.reservation.id,
            created_at: item.reservation.created_at,
            tickets: item
                .tickets
                .into_iter()
                .map(|t| TicketListItem {
                    id: t.ticket.id,
                    row: t.ticket.row,
                    seat: t.ticket.seat,
                    show_session: SessionListItem::new(t.show_session, &state.media),
                })
                .collect(),
        }
    }
}

// GET /api/planetarium/reservation?page=2&page_size=20
async fn list_reservations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = PageRequest::parse(&query, &state.config.pagination)?;
    let result = state
        .store
        .list_reservations(user.id, page.size, page.offset())
        .await?;

    let pages = page.page_count(result.count);
    if page.number > pages {
        return Err(ApiError::NotFound);
    }

    Ok(Json(Paginated {
        count: result.count,
        next: (page.number < pages).then_some(page.number + 1),
        previous: (page.number > 1).then_some(page.number - 1),
        results: result
            .items
            .into_iter()
            .map(|item| ReservationResponse::new(item, &state))
            .collect(),
    }))
}

/* ---------- CREATE ---------- */

#[derive(Debug, Deserialize, Serialize, Validate)]
struct TicketRequest {
    #[validate(range(min = 1, message = "Ensure this value is greater than or equal to 1."))]
    row: i32,
    #[validate(range(min = 1, message = "Ensure this value is greater than or equal to 1."))]
    seat: i32,
    show_session: i64,
}

// POST /api/planetarium/reservation
#[derive(Debug, Deserialize, Validate)]
struct CreateReservationRequest {
    #[validate(
        length(min = 1, message = "This list may not be empty."),
        nested
    )]
    tickets: Vec<TicketRequest>,
}

#[derive(Debug, Serialize)]
struct TicketResponse {
    id: i64,
    row: i32,
    seat: i32,
    show_session: i64,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            row: ticket.row,
            seat: ticket.seat,
            show_session: ticket.show_session_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreatedReservation {
    id: i64,
    created_at: DateTime<Utc>,
    tickets: Vec<TicketResponse>,
}

async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidJson(req): ValidJson<CreateReservationRequest>,
) -> ApiResult<impl IntoResponse> {
    let tickets: Vec<NewTicket> = req
        .tickets
        .iter()
        .map(|t| NewTicket {
            row: t.row,
            seat: t.seat,
            show_session_id: t.show_session,
        })
        .collect();

    let record = state.store.create_reservation(user.id, tickets).await?;
    info!(
        "reservation {} created by user {} with {} tickets",
        record.reservation.id,
        user.id,
        record.tickets.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatedReservation {
            id: record.reservation.id,
            created_at: record.reservation.created_at,
            tickets: record.tickets.into_iter().map(TicketResponse::from).collect(),
        }),
    ))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ShowSessionSummary;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Reservation {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Ticket {
    pub id: i64,
    pub row: i32,
    pub seat: i32,
    pub show_session_id: i64,
    pub reservation_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct NewTicket {
    pub row: i32,
    pub seat: i32,
    pub show_session_id: i64,
}

/// Бронь с билетами, отсортированными по (row, seat).
#[derive(Debug, Clone)]
pub struct ReservationRecord {
    pub reservation: Reservation,
    pub tickets: Vec<Ticket>,
}

/// Билет вместе со сводкой сеанса - для списка броней пользователя.
#[derive(Debug, Clone)]
pub struct TicketWithSession {
    pub ticket: Ticket,
    pub show_session: ShowSessionSummary,
}

/// Элемент списка броней пользователя.
#[derive(Debug, Clone)]
pub struct ReservationListItem {
    pub reservation: Reservation,
    pub tickets: Vec<TicketWithSession>,
}

/// Одна страница выдачи и общее число записей.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub count: i64,
    pub items: Vec<T>,
}

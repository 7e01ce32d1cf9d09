//! Проверки билетов брони: границы зала, дубли внутри запроса, занятые места.
//!
//! Функции чистые - оба хранилища вызывают их внутри своей транзакции,
//! когда уже известны размеры зала и занятые места.

use std::collections::HashSet;

use crate::error::FieldErrors;
use crate::models::{NewTicket, PlanetariumDome};

pub const SEAT_TAKEN: &str = "The fields show_session, row, seat must make a unique set.";

/// rows * seats_in_row - выданные билеты. Не уходит ниже нуля.
pub fn tickets_available(dome: &PlanetariumDome, issued: i64) -> i32 {
    let free = i64::from(dome.capacity()) - issued;
    free.clamp(0, i64::from(i32::MAX)) as i32
}

fn ticket_key(index: usize, field: &str) -> String {
    format!("tickets.{index}.{field}")
}

/// Ряд в [1, rows], место в [1, seats_in_row]. `false` если билет вне зала.
pub fn check_bounds(
    index: usize,
    ticket: &NewTicket,
    dome: &PlanetariumDome,
    errors: &mut FieldErrors,
) -> bool {
    let row_ok = (1..=dome.rows).contains(&ticket.row);
    let seat_ok = (1..=dome.seats_in_row).contains(&ticket.seat);
    if !row_ok {
        errors.add(
            ticket_key(index, "row"),
            format!(
                "row number must be in available range: (1, rows): (1, {})",
                dome.rows
            ),
        );
    }
    if !seat_ok {
        errors.add(
            ticket_key(index, "seat"),
            format!(
                "seat number must be in available range: (1, seats_in_row): (1, {})",
                dome.seats_in_row
            ),
        );
    }
    row_ok && seat_ok
}

pub fn unknown_session(index: usize, session_id: i64) -> (String, String) {
    (
        ticket_key(index, "show_session"),
        format!("Invalid pk \"{session_id}\" - object does not exist."),
    )
}

pub fn seat_taken(index: usize) -> (String, String) {
    (ticket_key(index, "non_field_errors"), SEAT_TAKEN.to_string())
}

/// Одно и то же место дважды в одном запросе.
pub fn check_duplicates(tickets: &[NewTicket]) -> FieldErrors {
    let mut seen = HashSet::with_capacity(tickets.len());
    let mut errors = FieldErrors::new();
    for (index, ticket) in tickets.iter().enumerate() {
        if !seen.insert((ticket.show_session_id, ticket.row, ticket.seat)) {
            let (field, message) = seat_taken(index);
            errors.add(field, message);
        }
    }
    errors
}

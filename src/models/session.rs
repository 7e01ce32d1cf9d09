use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{AstronomyShowRecord, PlanetariumDome};

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ShowSession {
    pub id: i64,
    pub astronomy_show_id: i64,
    pub planetarium_dome_id: i64,
    pub show_time: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewShowSession {
    pub astronomy_show_id: i64,
    pub planetarium_dome_id: i64,
    pub show_time: NaiveDateTime,
}

/// Строка списка сеансов с вычисленным `tickets_available`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ShowSessionSummary {
    pub id: i64,
    pub show_time: NaiveDateTime,
    pub astronomy_show_title: String,
    pub astronomy_show_image: Option<String>,
    pub planetarium_dome_name: String,
    pub planetarium_dome_capacity: i32,
    pub tickets_available: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, FromRow, Serialize)]
pub struct TakenPlace {
    pub row: i32,
    pub seat: i32,
}

#[derive(Debug, Clone)]
pub struct ShowSessionDetail {
    pub session: ShowSession,
    pub astronomy_show: AstronomyShowRecord,
    pub planetarium_dome: PlanetariumDome,
    pub taken_places: Vec<TakenPlace>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionFilter {
    pub date: Option<NaiveDate>,
    pub astronomy_show_id: Option<i64>,
}

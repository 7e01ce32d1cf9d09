use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PlanetariumDome {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

impl PlanetariumDome {
    pub fn capacity(&self) -> i32 {
        self.rows * self.seats_in_row
    }
}

#[derive(Debug, Clone)]
pub struct NewPlanetariumDome {
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

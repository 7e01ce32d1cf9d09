use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ShowTheme;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AstronomyShow {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Путь внутри media root, например `uploads/astronomy_show/orion-<uuid>.png`
    pub image: Option<String>,
}

/// Шоу вместе со своими темами (отсортированы по id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstronomyShowRecord {
    pub show: AstronomyShow,
    pub themes: Vec<ShowTheme>,
}

#[derive(Debug, Clone)]
pub struct NewAstronomyShow {
    pub title: String,
    pub description: String,
    pub theme_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ShowFilter {
    /// Регистронезависимое вхождение подстроки
    pub title: Option<String>,
    /// Шоу подходит, если помечено хотя бы одной из тем
    pub theme_ids: Option<Vec<i64>>,
}

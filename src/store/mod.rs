//! Хранилище: общий контракт и две реализации.
//!
//! - `PgStore` - PostgreSQL через sqlx, уникальность мест держит constraint.
//! - `MemoryStore` - таблицы в памяти под одним mutex, для тестов и запуска без БД.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::FieldErrors;
use crate::models::*;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("invalid data: {0}")]
    Invalid(FieldErrors),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Invalid(FieldErrors::single(field, message))
    }
}

impl From<FieldErrors> for StoreError {
    fn from(errors: FieldErrors) -> Self {
        StoreError::Invalid(errors)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) const TICKETS_OUTSIDE_DOME: &str =
    "Issued tickets of this session do not fit into the planetarium dome.";

pub(crate) fn invalid_pk(id: i64) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- users ---
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn get_user(&self, id: i64) -> StoreResult<User>;
    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User>;

    // --- show themes ---
    async fn list_themes(&self) -> StoreResult<Vec<ShowTheme>>;
    async fn create_theme(&self, name: &str) -> StoreResult<ShowTheme>;

    // --- domes ---
    async fn list_domes(&self) -> StoreResult<Vec<PlanetariumDome>>;
    async fn create_dome(&self, dome: NewPlanetariumDome) -> StoreResult<PlanetariumDome>;

    // --- astronomy shows ---
    async fn list_shows(&self, filter: &ShowFilter) -> StoreResult<Vec<AstronomyShowRecord>>;
    async fn get_show(&self, id: i64) -> StoreResult<AstronomyShowRecord>;
    async fn create_show(&self, show: NewAstronomyShow) -> StoreResult<AstronomyShowRecord>;
    async fn set_show_image(&self, id: i64, image: &str) -> StoreResult<AstronomyShow>;

    // --- show sessions ---
    async fn list_sessions(&self, filter: SessionFilter) -> StoreResult<Vec<ShowSessionSummary>>;
    async fn get_session(&self, id: i64) -> StoreResult<ShowSessionDetail>;
    async fn create_session(&self, session: NewShowSession) -> StoreResult<ShowSession>;
    async fn update_session(&self, id: i64, session: NewShowSession) -> StoreResult<ShowSession>;
    async fn delete_session(&self, id: i64) -> StoreResult<()>;

    // --- reservations ---
    async fn list_reservations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Page<ReservationListItem>>;

    /// Бронь и все её билеты атомарно: либо всё, либо ничего.
    async fn create_reservation(
        &self,
        user_id: i64,
        tickets: Vec<NewTicket>,
    ) -> StoreResult<ReservationRecord>;
}

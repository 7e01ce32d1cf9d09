pub mod domes;
pub mod reservations;
pub mod sessions;
pub mod shows;
pub mod themes;
pub mod users;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    let planetarium = Router::new()
        .merge(themes::routes())
        .merge(domes::routes())
        .merge(shows::routes())
        .merge(sessions::routes())
        .merge(reservations::routes());

    Router::new()
        .nest("/planetarium", planetarium)
        .nest("/user", users::routes())
}

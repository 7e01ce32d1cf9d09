pub mod config;
pub mod controllers;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::models::NewUser;
use crate::services::{auth, media::MediaStorage};
use crate::store::Store;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub media: MediaStorage,
    pub config: config::Config,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: config::Config) -> Arc<Self> {
        let media = MediaStorage::new(&config.media);
        Arc::new(Self { store, media, config })
    }

    /// Создаёт администратора из конфигурации, если его ещё нет.
    pub async fn ensure_admin(&self) -> anyhow::Result<()> {
        let (Some(email), Some(password)) = (
            self.config.auth.admin_email.as_deref(),
            self.config.auth.admin_password.as_deref(),
        ) else {
            return Ok(());
        };

        let email = email.trim().to_lowercase();
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Ok(());
        }

        let password_hash = auth::hash_password(password, self.config.auth.bcrypt_cost).await?;
        let admin = self
            .store
            .create_user(NewUser {
                email,
                password_hash,
                first_name: String::new(),
                last_name: String::new(),
                is_staff: true,
            })
            .await?;
        info!("Bootstrap admin {} created", admin.email);
        Ok(())
    }
}

/// Полный роутер сервиса: API, отдача media, трассировка запросов.
pub fn app(state: Arc<AppState>) -> Router {
    let media = ServeDir::new(state.media.root());
    let media_prefix = state.media.url_prefix().to_string();

    Router::new()
        .route("/", get(|| async { "Planetarium API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .nest_service(&media_prefix, media)
        .layer(DefaultBodyLimit::max(state.config.media.max_upload_bytes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

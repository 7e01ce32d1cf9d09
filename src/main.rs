use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use planetarium::{
    config::{Config, DEV_JWT_SECRET},
    store::{MemoryStore, PgStore, Store},
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    let registry = tracing_subscriber::registry().with(filter);
    if config.app.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config);

    info!("Starting Planetarium API ({})", config.app.environment);
    if config.is_production() && config.jwt.secret == DEV_JWT_SECRET {
        warn!("JWT_SECRET is not set, tokens are signed with the development secret");
    }

    let store: Arc<dyn Store> = match config.database.url.as_deref() {
        Some(url) => {
            let db = PgStore::connect(url, config.database.pool_size)
                .await
                .context("failed to connect to database")?;
            info!("Database connected");
            db.run_migrations().await.context("failed to run migrations")?;
            Arc::new(db)
        }
        None => {
            warn!("DATABASE_URL is not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, config.clone());
    state.ensure_admin().await.context("failed to create admin user")?;
    state
        .media
        .ensure_root()
        .await
        .context("failed to prepare media directory")?;

    let addr = format!("{}:{}", config.app.host, config.app.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, planetarium::app(state)).await?;
    Ok(())
}

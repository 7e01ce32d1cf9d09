use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
    pub pagination: PaginationConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `text` или `json`
    pub log_format: String,
}

// Настройки базы данных. Без url сервис работает на in-memory хранилище
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

// Настройки JWT
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

// Куда складываются загруженные изображения и под каким префиксом они отдаются
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub root: PathBuf,
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub page_size: u32,
    pub max_page_size: u32,
}

pub const DEV_JWT_SECRET: &str = "planetarium-dev-secret";

impl Config {
    /// Дефолты -> `PLANETARIUM_<SECTION>__<KEY>` -> привычные переменные (`PORT`, `DATABASE_URL`, ...).
    pub fn load() -> Result<Self, ConfigError> {
        Self::with_defaults()?
            .add_source(
                Environment::with_prefix("PLANETARIUM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("app.port", env::var("PORT").ok())?
            .set_override_option("app.rust_log", env::var("RUST_LOG").ok())?
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("jwt.secret", env::var("JWT_SECRET").ok())?
            .set_override_option("media.root", env::var("MEDIA_ROOT").ok())?
            .set_override_option("auth.admin_email", env::var("ADMIN_EMAIL").ok())?
            .set_override_option("auth.admin_password", env::var("ADMIN_PASSWORD").ok())?
            .build()?
            .try_deserialize()
    }

    /// Только значения по умолчанию, без окружения.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::with_defaults()?.build()?.try_deserialize()
    }

    fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8000_i64)?
            .set_default("app.environment", "development")?
            .set_default("app.rust_log", "planetarium=debug,tower_http=debug")?
            .set_default("app.log_format", "text")?
            .set_default("database.pool_size", 20_i64)?
            .set_default("jwt.secret", DEV_JWT_SECRET)?
            .set_default("jwt.access_ttl_minutes", 60_i64)?
            .set_default("jwt.refresh_ttl_hours", 24_i64)?
            .set_default("auth.bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))?
            .set_default("media.root", "media")?
            .set_default("media.url_prefix", "/media")?
            .set_default("media.max_upload_bytes", 10_i64 * 1024 * 1024)?
            .set_default("pagination.page_size", 10_i64)?
            .set_default("pagination.max_page_size", 100_i64)
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}

//! Загрузка изображений шоу: проверка содержимого и запись в media root.

use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::MediaConfig;

pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

const SHOW_IMAGE_DIR: &str = "uploads/astronomy_show";

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")]
    InvalidImage,

    #[error("media io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStorage {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            root: config.root.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Публичный URL для пути внутри media root.
    pub fn url(&self, relative: &str) -> String {
        format!("{}/{}", self.url_prefix, relative.trim_start_matches('/'))
    }

    pub async fn ensure_root(&self) -> Result<(), MediaError> {
        tokio::fs::create_dir_all(self.root.join(SHOW_IMAGE_DIR)).await?;
        Ok(())
    }

    /// Проверяет, что байты - декодируемое изображение, и сохраняет как
    /// `uploads/astronomy_show/<slug>-<uuid>.<ext>`. Возвращает относительный путь.
    pub async fn save_show_image(&self, title: &str, bytes: &[u8]) -> Result<String, MediaError> {
        let format = detect_image(bytes)?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let relative = format!("{SHOW_IMAGE_DIR}/{}-{}.{extension}", slugify(title), Uuid::new_v4());

        let path = self.root.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        info!("Saved show image {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }
}

/// Формат определяется по сигнатуре, затем изображение целиком декодируется.
pub fn detect_image(bytes: &[u8]) -> Result<ImageFormat, MediaError> {
    let format = image::guess_format(bytes).map_err(|_| MediaError::InvalidImage)?;
    image::load_from_memory_with_format(bytes, format).map_err(|_| MediaError::InvalidImage)?;
    Ok(format)
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "show".to_string()
    } else {
        slug.to_string()
    }
}

//! Image I/O operations service
//!
//! Keeps file and decode concerns out of the session so that it only ever sees decoded
//! RGBA pixels.

use crate::error::{CutoutError, Result};
use image::RgbaImage;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Where a batch item's pixels come from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Image file on disk
    Path(PathBuf),
    /// Encoded image bytes (PNG, JPEG, WebP, TIFF)
    Bytes(Arc<[u8]>),
    /// Already-decoded pixels
    Decoded(Arc<RgbaImage>),
}

impl ImageSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(bytes.into())
    }

    #[must_use]
    pub fn decoded(image: RgbaImage) -> Self {
        Self::Decoded(Arc::new(image))
    }

    /// File stem for paths, used to name exports
    #[must_use]
    pub fn stem(&self) -> Option<&str> {
        match self {
            Self::Path(path) => path.file_stem().and_then(|s| s.to_str()),
            Self::Bytes(_) | Self::Decoded(_) => None,
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Bytes(bytes) => write!(f, "<{} encoded bytes>", bytes.len()),
            Self::Decoded(image) => write!(f, "<{}x{} image>", image.width(), image.height()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<RgbaImage> for ImageSource {
    fn from(image: RgbaImage) -> Self {
        Self::decoded(image)
    }
}

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Resolve any source into decoded RGBA pixels
    pub async fn load_source(source: &ImageSource) -> Result<Arc<RgbaImage>> {
        match source {
            ImageSource::Path(path) => Self::load_image(path).await.map(Arc::new),
            ImageSource::Bytes(bytes) => Self::load_from_bytes(bytes).map(Arc::new),
            ImageSource::Decoded(image) => Ok(Arc::clone(image)),
        }
    }

    /// Load an image file, detecting the format from content and then from the extension
    pub async fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
        let path_ref = path.as_ref();
        let data = tokio::fs::read(path_ref)
            .await
            .map_err(|e| CutoutError::file_io_error("read image file", path_ref, &e))?;

        match image::load_from_memory(&data) {
            Ok(image) => Ok(image.to_rgba8()),
            Err(content_err) => {
                log::debug!(
                    "Content-based detection failed for {}: {}. Trying the file extension.",
                    path_ref.display(),
                    content_err
                );
                let format = image::ImageFormat::from_path(path_ref)?;
                image::load_from_memory_with_format(&data, format)
                    .map(|image| image.to_rgba8())
                    .map_err(|e| {
                        CutoutError::processing(format!(
                            "Failed to decode {} ({} bytes): {}",
                            path_ref.display(),
                            data.len(),
                            e
                        ))
                    })
            },
        }
    }

    /// Decode encoded image bytes
    pub fn load_from_bytes(bytes: &[u8]) -> Result<RgbaImage> {
        image::load_from_memory(bytes)
            .map(|image| image.to_rgba8())
            .map_err(|e| CutoutError::processing(format!("Failed to decode image from bytes: {}", e)))
    }

    /// Write encoded bytes, creating parent directories as needed
    pub async fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CutoutError::file_io_error("create output directory", parent, &e))?;
        }
        tokio::fs::write(path_ref, bytes)
            .await
            .map_err(|e| CutoutError::file_io_error("write file", path_ref, &e))
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif"
                )
            })
    }
}

//! Export of the current cutout
//!
//! Crops a masked buffer to its tight bounds, applies the display rotation, encodes a
//! full-resolution image plus a bounded thumbnail, and hands both to an [`ExportStore`].

use crate::{
    buffer::PixelBuffer,
    config::{OutputFormat, SessionConfig},
    error::{CutoutError, Result},
    services::{format::OutputFormatHandler, io::ImageIOService},
    types::{Rotation, Threshold, TightBounds},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};
use uuid::Uuid;

/// Descriptive record stored alongside an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Display label of the image source, when known
    pub source: Option<String>,
    pub subject_index: usize,
    pub threshold: Threshold,
    pub rotation: Rotation,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub created_at: DateTime<Utc>,
}

/// Encoded cutout ready for a store
#[derive(Debug, Clone)]
pub struct ExportPayload {
    pub image: Vec<u8>,
    pub thumbnail: Vec<u8>,
    pub metadata: ExportMetadata,
}

/// Identifiers a store hands back for one export
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub image_id: String,
    pub thumbnail_id: String,
}

/// What is being exported, beyond the pixels themselves
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    pub source: Option<&'a str>,
    pub subject_index: usize,
    pub threshold: Threshold,
    pub rotation: Rotation,
}

/// Stateless crop/rotate/encode pipeline
pub struct ExportService;

impl ExportService {
    /// Crop `pixels` to `bounds` and rotate.
    ///
    /// # Errors
    /// `CutoutError::EmptyMask` when `bounds` is `None`; a processing error when the
    /// bounds do not lie inside the buffer.
    pub fn render(pixels: &PixelBuffer, bounds: TightBounds, rotation: Rotation) -> Result<RgbaImage> {
        let bounds = bounds.ok_or(CutoutError::EmptyMask)?;
        let coord = |value: i32| {
            u32::try_from(value)
                .map_err(|_| CutoutError::processing(format!("Negative crop coordinate {}", value)))
        };
        let cropped = pixels.crop_to_rgba(
            coord(bounds.min_x)?,
            coord(bounds.min_y)?,
            coord(bounds.max_x)?,
            coord(bounds.max_y)?,
        )?;

        Ok(match rotation {
            Rotation::Deg0 => cropped,
            Rotation::Deg90 => imageops::rotate90(&cropped),
            Rotation::Deg180 => imageops::rotate180(&cropped),
            Rotation::Deg270 => imageops::rotate270(&cropped),
        })
    }

    /// Largest size within `max_width × max_height` that keeps the aspect ratio.
    /// Never upscales and never returns a zero dimension.
    #[must_use]
    pub fn thumbnail_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width, height);
        }
        let scale = (f64::from(max_width) / f64::from(width))
            .min(f64::from(max_height) / f64::from(height))
            .min(1.0);
        let scaled = |value: u32| ((f64::from(value) * scale).round() as u32).max(1);
        (scaled(width), scaled(height))
    }

    /// Render, thumbnail and encode the cutout
    pub fn prepare(
        pixels: &PixelBuffer,
        bounds: TightBounds,
        request: ExportRequest<'_>,
        config: &SessionConfig,
    ) -> Result<ExportPayload> {
        let rendered = Self::render(pixels, bounds, request.rotation)?;
        let (width, height) = rendered.dimensions();
        let (thumbnail_width, thumbnail_height) = Self::thumbnail_dimensions(
            width,
            height,
            config.thumbnail_max_width,
            config.thumbnail_max_height,
        );

        let thumbnail = if (thumbnail_width, thumbnail_height) == (width, height) {
            OutputFormatHandler::encode(&rendered, config.output_format)?
        } else {
            let resized = imageops::thumbnail(&rendered, thumbnail_width, thumbnail_height);
            OutputFormatHandler::encode(&resized, config.output_format)?
        };
        let image = OutputFormatHandler::encode(&rendered, config.output_format)?;

        tracing::debug!(
            width,
            height,
            thumbnail_width,
            thumbnail_height,
            rotation = request.rotation.degrees(),
            bytes = image.len(),
            "Prepared export"
        );

        Ok(ExportPayload {
            image,
            thumbnail,
            metadata: ExportMetadata {
                source: request.source.map(str::to_string),
                subject_index: request.subject_index,
                threshold: request.threshold,
                rotation: request.rotation,
                format: config.output_format,
                width,
                height,
                thumbnail_width,
                thumbnail_height,
                created_at: Utc::now(),
            },
        })
    }
}

/// Destination for finished exports
#[async_trait]
pub trait ExportStore: Send + Sync {
    /// Persist the payload and return identifiers for the stored image and thumbnail
    async fn store(&self, payload: &ExportPayload) -> Result<ExportReceipt>;
}

/// Writes exports into a directory as `<name>.<ext>`, `<name>-thumb.<ext>` and a
/// `<name>.json` metadata sidecar
#[derive(Debug, Clone)]
pub struct DirectoryExportStore {
    root: PathBuf,
}

impl DirectoryExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn base_name(metadata: &ExportMetadata) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let short_id = id.get(..8).unwrap_or(&id);
        match metadata.source.as_deref().and_then(|s| Path::new(s).file_stem()?.to_str()) {
            Some(stem) => format!("{}-subject{}-{}", stem, metadata.subject_index, short_id),
            None => id,
        }
    }
}

#[async_trait]
impl ExportStore for DirectoryExportStore {
    async fn store(&self, payload: &ExportPayload) -> Result<ExportReceipt> {
        let base = Self::base_name(&payload.metadata);
        let extension = OutputFormatHandler::get_extension(payload.metadata.format);
        let image_name = format!("{}.{}", base, extension);
        let thumbnail_name = format!("{}-thumb.{}", base, extension);

        ImageIOService::write_bytes(self.root.join(&image_name), &payload.image).await?;
        ImageIOService::write_bytes(self.root.join(&thumbnail_name), &payload.thumbnail).await?;
        let sidecar = serde_json::to_vec_pretty(&payload.metadata)?;
        ImageIOService::write_bytes(self.root.join(format!("{}.json", base)), &sidecar).await?;

        tracing::info!(image = %image_name, dir = %self.root.display(), "Stored export");
        Ok(ExportReceipt {
            image_id: image_name,
            thumbnail_id: thumbnail_name,
        })
    }
}

/// In-memory store, mainly for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryExportStore {
    entries: Mutex<HashMap<String, ExportPayload>>,
}

impl MemoryExportStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a payload by either of its receipt identifiers
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ExportPayload> {
        let key = id.strip_suffix("-thumb").unwrap_or(id);
        self.entries.lock().ok()?.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExportStore for MemoryExportStore {
    async fn store(&self, payload: &ExportPayload) -> Result<ExportReceipt> {
        let id = Uuid::new_v4().to_string();
        self.entries
            .lock()
            .map_err(|_| CutoutError::export("memory store lock poisoned"))?
            .insert(id.clone(), payload.clone());
        Ok(ExportReceipt {
            thumbnail_id: format!("{}-thumb", id),
            image_id: id,
        })
    }
}

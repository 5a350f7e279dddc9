//! Configuration types for subject cutout sessions

use crate::{
    buffer::TRANSPARENT,
    error::{CutoutError, Result},
    types::Threshold,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default longest-edge caps for exported thumbnails
pub const DEFAULT_THUMBNAIL_MAX_WIDTH: u32 = 300;
pub const DEFAULT_THUMBNAIL_MAX_HEIGHT: u32 = 450;

/// Encoded output format for exported cutouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// Lossless WebP with alpha channel transparency
    WebP,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::WebP => write!(f, "webp"),
        }
    }
}

/// Configuration for a segmentation session and its exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Threshold applied to each new image and after every subject change
    pub default_threshold: Threshold,

    /// Packed RGBA colour written for pixels below the threshold
    pub transparent_color: u32,

    /// Thumbnail width cap in pixels
    pub thumbnail_max_width: u32,

    /// Thumbnail height cap in pixels
    pub thumbnail_max_height: u32,

    /// Encoding for exported full-size images and thumbnails
    pub output_format: OutputFormat,

    /// Report every processing stage, not just completions
    pub verbose_progress: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_threshold: Threshold::DEFAULT,
            transparent_color: TRANSPARENT,
            thumbnail_max_width: DEFAULT_THUMBNAIL_MAX_WIDTH,
            thumbnail_max_height: DEFAULT_THUMBNAIL_MAX_HEIGHT,
            output_format: OutputFormat::Png,
            verbose_progress: false,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Check invariants that serde cannot express
    ///
    /// # Errors
    /// Returns `CutoutError::InvalidConfig` for zero thumbnail caps or an output format
    /// whose encoder is not compiled in.
    pub fn validate(&self) -> Result<()> {
        if self.thumbnail_max_width == 0 {
            return Err(CutoutError::config_value_error(
                "thumbnail_max_width",
                self.thumbnail_max_width,
                "1 or more",
            ));
        }
        if self.thumbnail_max_height == 0 {
            return Err(CutoutError::config_value_error(
                "thumbnail_max_height",
                self.thumbnail_max_height,
                "1 or more",
            ));
        }
        if self.output_format == OutputFormat::WebP && !cfg!(feature = "webp-support") {
            return Err(CutoutError::invalid_config(
                "WebP output requires the `webp-support` feature",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CutoutError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&content)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. one loaded from disk)
    #[must_use]
    pub fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn default_threshold(mut self, threshold: Threshold) -> Self {
        self.config.default_threshold = threshold;
        self
    }

    #[must_use]
    pub fn transparent_color(mut self, color: u32) -> Self {
        self.config.transparent_color = color;
        self
    }

    #[must_use]
    pub fn thumbnail_size(mut self, max_width: u32, max_height: u32) -> Self {
        self.config.thumbnail_max_width = max_width;
        self.config.thumbnail_max_height = max_height;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn verbose_progress(mut self, verbose: bool) -> Self {
        self.config.verbose_progress = verbose;
        self
    }

    /// Build the session configuration
    ///
    /// # Errors
    /// Returns `CutoutError::InvalidConfig` when validation fails.
    pub fn build(self) -> Result<SessionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

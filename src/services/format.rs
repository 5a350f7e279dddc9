//! Output format handling service
//!
//! Encodes cutouts into the configured container. Both supported formats keep the alpha
//! channel, so transparent pixels survive the round trip.

use crate::{
    config::OutputFormat,
    error::{CutoutError, Result},
};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an RGBA image
    ///
    /// # Examples
    /// ```rust
    /// use subject_cutout::{config::OutputFormat, services::OutputFormatHandler};
    /// use image::RgbaImage;
    ///
    /// let bytes = OutputFormatHandler::encode(&RgbaImage::new(4, 4), OutputFormat::Png)?;
    /// assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn encode(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
        let image_format = Self::image_format(format)?;
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image_format)?;
        Ok(buffer.into_inner())
    }

    fn image_format(format: OutputFormat) -> Result<ImageFormat> {
        match format {
            OutputFormat::Png => Ok(ImageFormat::Png),
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => Ok(ImageFormat::WebP),
            #[cfg(not(feature = "webp-support"))]
            OutputFormat::WebP => Err(CutoutError::invalid_config(
                "WebP output requires the `webp-support` feature",
            )),
        }
    }

    /// File extension (without the dot) for a given output format
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    #[must_use]
    pub fn mime_type(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// Parse a user-supplied format name (`png`, `webp`)
    pub fn parse(name: &str) -> Result<OutputFormat> {
        match name.to_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            other => Err(CutoutError::config_value_error(
                "output format",
                other,
                "png, webp",
            )),
        }
    }
}

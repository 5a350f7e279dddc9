//! Error types for subject cutout operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for subject cutout operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Reason a segmentation request did not produce a usable result.
///
/// These travel as values across the async segmenter boundary. "No subjects found" is
/// deliberately absent: an empty result is a successful outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum FailureReason {
    /// The image source could not be read or decoded
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// The image decoded but the segmenter rejected it
    #[error("image not recognized: {0}")]
    ImageNotRecognized(String),

    /// The segmentation backend is not ready (e.g. model still downloading)
    #[error("segmentation model unavailable: {0}")]
    ModelUnavailable(String),

    /// The segmenter returned subjects that do not fit the submitted image
    #[error("malformed segmentation result: {0}")]
    MalformedResult(String),
}

impl FailureReason {
    /// Short machine-friendly label, used in logs and export metadata
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageNotFound(_) => "image_not_found",
            Self::ImageNotRecognized(_) => "image_not_recognized",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::MalformedResult(_) => "malformed_result",
        }
    }
}

/// Comprehensive error types for subject cutout operations
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration or metadata (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Compositing or buffer errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// A request is already in flight on this session
    #[error("Session busy: request {in_flight} has not completed")]
    SessionBusy { in_flight: u64 },

    /// A segmentation result arrived for a request that is no longer current
    #[error("Stale segmentation result for request {ticket} (current request is {current})")]
    StaleResult { ticket: u64, current: u64 },

    /// No pixel passed the threshold, so there is nothing to crop
    #[error("Mask is empty at the current threshold")]
    EmptyMask,

    /// Export hand-off failures
    #[error("Export error: {0}")]
    Export(String),

    /// Segmentation failure surfaced as an error (convenience APIs only)
    #[error("Segmentation failed: {0}")]
    Segmentation(#[from] FailureReason),
}

impl CutoutError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new export error
    pub fn export<S: Into<String>>(msg: S) -> Self {
        Self::Export(msg.into())
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = CutoutError::invalid_config("thumbnail width must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: thumbnail width must be positive"
        );

        let err = CutoutError::StaleResult {
            ticket: 3,
            current: 5,
        };
        assert!(err.to_string().contains("request 3"));
        assert!(err.to_string().contains("current request is 5"));
    }

    #[test]
    fn test_failure_reason_kinds() {
        assert_eq!(
            FailureReason::ImageNotFound("x".into()).kind(),
            "image_not_found"
        );
        assert_eq!(
            FailureReason::ModelUnavailable("downloading".into()).to_string(),
            "segmentation model unavailable: downloading"
        );
    }

    #[test]
    fn test_failure_reason_converts_into_error() {
        let err: CutoutError = FailureReason::ImageNotRecognized("too small".into()).into();
        assert!(matches!(
            err,
            CutoutError::Segmentation(FailureReason::ImageNotRecognized(_))
        ));
    }

    #[test]
    fn test_contextual_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CutoutError::file_io_error("write cutout", Path::new("/out/a.png"), &io_error);
        let msg = err.to_string();
        assert!(msg.contains("write cutout"));
        assert!(msg.contains("/out/a.png"));

        let err = CutoutError::config_value_error("threshold", 1.5, "0.1-0.9");
        assert!(err.to_string().contains("0.1-0.9"));
    }
}

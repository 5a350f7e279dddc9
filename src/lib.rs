#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Subject Cutout
//!
//! A subject-mask compositing engine. Given a photograph and per-subject confidence maps
//! from a segmentation model, it produces a background-removed image of one selected
//! subject at a chosen confidence threshold, tracks its tight bounding box and exports a
//! cropped, rotated cutout with a thumbnail.
//!
//! ## Features
//!
//! - **Reusable buffers**: pixel storage grows to the largest image seen and is never
//!   reallocated for smaller ones
//! - **Single-pass compositing**: one confidence read per pixel, tight bounds computed in
//!   the same pass
//! - **Subject and threshold navigation**: cycle subjects, step the threshold in tenths
//!   between 0.1 and 0.9
//! - **Async segmentation boundary**: plug in any model through [`SubjectSegmenter`];
//!   stale results are discarded by generation
//! - **Batch driver**: walk a queue of images, skipping those without subjects
//! - **Export**: crop, rotate and encode PNG or WebP with a thumbnail, then hand off to an
//!   [`ExportStore`]
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subject_cutout::{
//!     BorderKeyConfig, BorderKeySegmenter, ImageSource, SegmentationSession, SessionOutcome,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let segmenter = BorderKeySegmenter::new(BorderKeyConfig::default())?;
//! let mut session = SegmentationSession::new(Arc::new(segmenter));
//!
//! if let SessionOutcome::SubjectsFound(count) =
//!     session.process(&ImageSource::path("photo.jpg")).await?
//! {
//!     println!("{} subject(s), bounds {:?}", count, session.bounding_box());
//!     session.increase_threshold()?;
//!     let payload = session.export_current()?;
//!     std::fs::write("cutout.png", &payload.image)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Processing
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subject_cutout::{
//!     BatchController, BatchEvent, BorderKeyConfig, BorderKeySegmenter, DirectoryExportStore,
//!     ExportStore, ImageSource, SegmentationSession,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let segmenter = BorderKeySegmenter::new(BorderKeyConfig::default())?;
//! let session = SegmentationSession::new(Arc::new(segmenter));
//! let sources = vec![ImageSource::path("a.jpg"), ImageSource::path("b.jpg")];
//! let mut batch = BatchController::new(session, sources);
//! let store = DirectoryExportStore::new("cutouts");
//!
//! while let Some(event) = batch.next_image().await? {
//!     if let BatchEvent::MaskedImageReady { .. } = event {
//!         store.store(&batch.session().export_current()?).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface and tracing setup
//! - `webp-support` (default): WebP output
//! - `tracing-json`: JSON log output for the CLI
//! - `tracing-files`: log file output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! subject-cutout = { version = "0.1", default-features = false }
//! ```

pub mod backends;
pub mod batch;
pub mod buffer;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod confidence;
pub mod config;
pub mod error;
pub mod segmentation;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use std::sync::Arc;
use tokio::io::AsyncRead;

// Public API exports
pub use backends::{
    BorderKeyConfig, BorderKeySegmenter, CallbackSegmenter, MockSegmenter,
    SegmentationCompletion,
};
pub use batch::{BatchController, BatchEvent, BatchStats};
pub use buffer::{pack_rgba, unpack_rgba, PixelBuffer, TRANSPARENT};
pub use compositor::{SubjectMaskCompositor, SubjectMaskOutput};
pub use confidence::{ConfidenceMap, ConfidenceStream, QuantizedMask};
pub use config::{OutputFormat, SessionConfig, SessionConfigBuilder};
pub use error::{CutoutError, FailureReason, Result};
pub use segmentation::{SegmentationOutcome, SegmentationResult, Subject, SubjectSegmenter};
pub use services::{
    ConsoleProgressReporter, DirectoryExportStore, ExportMetadata, ExportPayload,
    ExportReceipt, ExportService, ExportStore, ImageIOService, ImageSource, MemoryExportStore,
    NoOpProgressReporter, OutputFormatHandler, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
pub use session::{SegmentationSession, SessionOutcome, SessionStatus, Ticket};
pub use types::{BoundingBox, ProcessingTimings, RawImage, Rotation, Threshold, TightBounds};

#[cfg(feature = "cli")]
pub use tracing_config::{events, spans, TracingConfig, TracingFormat, TracingOutput};

/// Cut the largest subject out of an encoded image in one call
///
/// Segments `image_bytes` with `segmenter`, composites the first subject at the
/// configured default threshold and encodes the cropped result.
///
/// # Returns
///
/// `Ok(None)` when the image contains no subjects.
///
/// # Errors
///
/// - `CutoutError::Segmentation` when decoding or segmentation fails
/// - `CutoutError::EmptyMask` when no pixel of the subject passes the threshold
/// - `CutoutError::InvalidConfig` when `config` fails validation
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use subject_cutout::{cutout_from_bytes, BorderKeyConfig, BorderKeySegmenter, SessionConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let segmenter = Arc::new(BorderKeySegmenter::new(BorderKeyConfig::default())?);
/// if let Some(payload) = cutout_from_bytes(&upload, segmenter, SessionConfig::default()).await? {
///     std::fs::write("cutout.png", &payload.image)?;
/// }
/// # Ok(())
/// # }
/// ```
pub async fn cutout_from_bytes(
    image_bytes: &[u8],
    segmenter: Arc<dyn SubjectSegmenter>,
    config: SessionConfig,
) -> Result<Option<ExportPayload>> {
    let mut session = SegmentationSession::with_config(segmenter, config)?;
    match session.process(&ImageSource::bytes(image_bytes)).await? {
        SessionOutcome::SubjectsFound(_) => session.export_current().map(Some),
        SessionOutcome::NoSubjects => Ok(None),
        SessionOutcome::Failed(reason) => Err(CutoutError::Segmentation(reason)),
    }
}

/// Like [`cutout_from_bytes`], reading the encoded image from an async stream first
pub async fn cutout_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    segmenter: Arc<dyn SubjectSegmenter>,
    config: SessionConfig,
) -> Result<Option<ExportPayload>> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer).await?;
    cutout_from_bytes(&buffer, segmenter, config).await
}

//! Per-image segmentation session
//!
//! A session owns the decoded image, the segmentation result and the compositor, and
//! tracks which subject is selected at which threshold. Buffers are reused from image to
//! image; they only grow.
//!
//! Segmentation is asynchronous and single-shot. [`SegmentationSession::process`] covers
//! the common case; [`begin`](SegmentationSession::begin) and
//! [`complete`](SegmentationSession::complete) expose the two halves for integrations that
//! deliver results through callbacks. Every request carries a generation number so that a
//! late result for an abandoned request is discarded instead of overwriting newer state.

use crate::{
    buffer::PixelBuffer,
    compositor::SubjectMaskCompositor,
    config::SessionConfig,
    error::{CutoutError, FailureReason, Result},
    segmentation::{SegmentationOutcome, SegmentationResult, Subject, SubjectSegmenter},
    services::{
        export::{ExportPayload, ExportRequest, ExportService},
        io::{ImageIOService, ImageSource},
    },
    types::{ProcessingTimings, RawImage, Rotation, Threshold, TightBounds},
};
use image::RgbaImage;
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, warn, Instrument, Level};

/// Handle for one in-flight segmentation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    generation: u64,
}

impl Ticket {
    #[must_use]
    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// Where the session is in its per-image lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No image, or the last request was abandoned
    Idle,
    /// Waiting on the segmenter
    Submitting { generation: u64 },
    /// Subjects found; the first one has been composited
    Succeeded { subjects: usize },
    /// Segmentation succeeded but found nothing
    NoSubjects,
    Failed(FailureReason),
}

/// Terminal result of processing one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    SubjectsFound(usize),
    NoSubjects,
    Failed(FailureReason),
}

impl SessionOutcome {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::SubjectsFound(_))
    }
}

/// Segmentation and compositing state for one image at a time
pub struct SegmentationSession {
    segmenter: Arc<dyn SubjectSegmenter>,
    config: SessionConfig,
    raw: RawImage,
    compositor: SubjectMaskCompositor,
    result: Option<SegmentationResult>,
    subject_index: usize,
    threshold: Threshold,
    rotation: Rotation,
    bounds: TightBounds,
    status: SessionStatus,
    generation: u64,
    source_label: Option<String>,
    submitted_at: Option<Instant>,
    timings: ProcessingTimings,
}

impl SegmentationSession {
    /// Session with the default configuration
    pub fn new(segmenter: Arc<dyn SubjectSegmenter>) -> Self {
        Self::build(segmenter, SessionConfig::default())
    }

    /// # Errors
    /// Returns `CutoutError::InvalidConfig` when the configuration fails validation.
    pub fn with_config(segmenter: Arc<dyn SubjectSegmenter>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(segmenter, config))
    }

    fn build(segmenter: Arc<dyn SubjectSegmenter>, config: SessionConfig) -> Self {
        Self {
            segmenter,
            compositor: SubjectMaskCompositor::with_transparent_color(config.transparent_color),
            threshold: config.default_threshold,
            config,
            raw: RawImage::new(),
            result: None,
            subject_index: 0,
            rotation: Rotation::Deg0,
            bounds: None,
            status: SessionStatus::Idle,
            generation: 0,
            source_label: None,
            submitted_at: None,
            timings: ProcessingTimings::default(),
        }
    }

    /// Decode `source`, segment it and composite the first subject.
    ///
    /// Unreadable sources and segmenter failures are reported as
    /// [`SessionOutcome::Failed`], not as errors.
    ///
    /// # Errors
    /// `CutoutError::SessionBusy` when a two-phase request is still outstanding.
    #[instrument(skip(self, source), fields(source = %source, segmenter = self.segmenter.name()))]
    pub async fn process(&mut self, source: &ImageSource) -> Result<SessionOutcome> {
        self.ensure_not_busy()?;
        let total_start = Instant::now();

        let decode_start = Instant::now();
        let image = match ImageIOService::load_source(source).await {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "Could not load image source");
                self.reset_for_new_image(Some(source.to_string()));
                let reason = FailureReason::ImageNotFound(e.to_string());
                self.status = SessionStatus::Failed(reason.clone());
                return Ok(SessionOutcome::Failed(reason));
            },
        };
        let image_decode_ms = decode_start.elapsed().as_millis() as u64;

        let ticket = self.begin(&image)?;
        // Only file sources have a name worth recording
        self.source_label = source.stem().map(|_| source.to_string());

        let outcome = if self.segmenter.is_ready() {
            let segmenter = Arc::clone(&self.segmenter);
            let span = span!(Level::INFO, "segmentation", backend = segmenter.name());
            segmenter.submit(&self.raw).instrument(span).await
        } else {
            Err(FailureReason::ModelUnavailable(format!(
                "{} is not ready",
                self.segmenter.name()
            )))
        };

        let session_outcome = self.complete(ticket, outcome)?;
        self.timings.image_decode_ms = image_decode_ms;
        self.timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            outcome = ?session_outcome,
            timings = %self.timings.summary(),
            "Image processed"
        );
        Ok(session_outcome)
    }

    /// Load `image` and open a new request; feed the segmenter's answer to
    /// [`complete`](Self::complete).
    ///
    /// # Errors
    /// `CutoutError::SessionBusy` while a previous request is outstanding.
    pub fn begin(&mut self, image: &RgbaImage) -> Result<Ticket> {
        self.ensure_not_busy()?;
        self.reset_for_new_image(None);
        self.raw.load(image);

        self.generation += 1;
        self.status = SessionStatus::Submitting {
            generation: self.generation,
        };
        self.submitted_at = Some(Instant::now());

        debug!(
            generation = self.generation,
            width = self.raw.width(),
            height = self.raw.height(),
            raw_capacity = self.raw.capacity(),
            "Segmentation request opened"
        );
        Ok(Ticket {
            generation: self.generation,
        })
    }

    /// Apply the segmenter's answer for `ticket`.
    ///
    /// # Errors
    /// `CutoutError::StaleResult` when `ticket` is not the outstanding request; the
    /// outcome is dropped and the session is unchanged.
    pub fn complete(&mut self, ticket: Ticket, outcome: SegmentationOutcome) -> Result<SessionOutcome> {
        let outstanding = matches!(
            self.status,
            SessionStatus::Submitting { generation } if generation == ticket.generation
        );
        if !outstanding {
            warn!(
                ticket = ticket.generation,
                current = self.generation,
                "Discarding stale segmentation result"
            );
            return Err(CutoutError::StaleResult {
                ticket: ticket.generation,
                current: self.generation,
            });
        }

        if let Some(submitted_at) = self.submitted_at.take() {
            self.timings.segmentation_ms = submitted_at.elapsed().as_millis() as u64;
        }

        let result = match outcome.and_then(|result| {
            result.validate_against(&self.raw)?;
            Ok(result)
        }) {
            Ok(result) => result,
            Err(reason) => return Ok(self.fail(reason)),
        };

        if result.is_empty() {
            self.status = SessionStatus::NoSubjects;
            return Ok(SessionOutcome::NoSubjects);
        }

        let subjects = result.len();
        self.result = Some(result);
        if let Err(e) = self.recomposite() {
            self.result = None;
            return Ok(self.fail(FailureReason::MalformedResult(e.to_string())));
        }

        self.status = SessionStatus::Succeeded { subjects };
        Ok(SessionOutcome::SubjectsFound(subjects))
    }

    /// Drop the outstanding request, if any. A result that arrives later is stale.
    pub fn abandon(&mut self) -> bool {
        if !matches!(self.status, SessionStatus::Submitting { .. }) {
            return false;
        }
        self.generation += 1;
        self.status = SessionStatus::Idle;
        self.submitted_at = None;
        debug!(generation = self.generation, "Segmentation request abandoned");
        true
    }

    /// Raise the threshold one step and recomposite. `false` at the upper bound or without subjects.
    pub fn increase_threshold(&mut self) -> Result<bool> {
        self.step_threshold(Threshold::raised)
    }

    /// Lower the threshold one step and recomposite. `false` at the lower bound or without subjects.
    pub fn decrease_threshold(&mut self) -> Result<bool> {
        self.step_threshold(Threshold::lowered)
    }

    fn step_threshold(&mut self, step: fn(Threshold) -> Option<Threshold>) -> Result<bool> {
        if !self.has_subjects() {
            return Ok(false);
        }
        let Some(threshold) = step(self.threshold) else {
            return Ok(false);
        };
        self.select(self.subject_index, threshold)?;
        Ok(true)
    }

    /// Select the next subject (wrapping), reset the threshold and recomposite.
    /// `false` when there is at most one subject.
    pub fn next_subject(&mut self) -> Result<bool> {
        let count = self.subject_count();
        if count <= 1 {
            return Ok(false);
        }
        self.select((self.subject_index + 1) % count, self.config.default_threshold)?;
        Ok(true)
    }

    /// Turn the export orientation 90° clockwise
    pub fn rotate_clockwise(&mut self) -> Rotation {
        self.rotation = self.rotation.clockwise();
        self.rotation
    }

    /// Turn the export orientation 90° counter-clockwise
    pub fn rotate_counter_clockwise(&mut self) -> Rotation {
        self.rotation = self.rotation.counter_clockwise();
        self.rotation
    }

    /// Crop, rotate and encode the current cutout
    ///
    /// # Errors
    /// - `CutoutError::Processing` without a successful result
    /// - `CutoutError::EmptyMask` when nothing passes the current threshold
    pub fn export_current(&self) -> Result<ExportPayload> {
        if !self.has_subjects() {
            return Err(CutoutError::processing("No cutout to export"));
        }
        let _span = span!(
            Level::DEBUG,
            "export",
            subject = self.subject_index,
            rotation = self.rotation.degrees()
        )
        .entered();
        ExportService::prepare(
            self.compositor.output(),
            self.bounds,
            ExportRequest {
                source: self.source_label.as_deref(),
                subject_index: self.subject_index,
                threshold: self.threshold,
                rotation: self.rotation,
            },
            &self.config,
        )
    }

    /// Masked pixels of the selected subject at the current threshold
    #[must_use]
    pub fn masked_image(&self) -> Option<&PixelBuffer> {
        self.has_subjects().then(|| self.compositor.output())
    }

    /// Tight bounds of the current mask; `None` when nothing passes or there are no subjects
    #[must_use]
    pub fn bounding_box(&self) -> TightBounds {
        if self.has_subjects() {
            self.bounds
        } else {
            None
        }
    }

    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.result.as_ref().map_or(0, SegmentationResult::len)
    }

    #[must_use]
    pub fn has_subjects(&self) -> bool {
        self.subject_count() > 0
    }

    #[must_use]
    pub fn current_subject(&self) -> Option<&Subject> {
        self.result.as_ref()?.subjects().get(self.subject_index)
    }

    #[must_use]
    pub fn subject_index(&self) -> usize {
        self.subject_index
    }

    #[must_use]
    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    #[must_use]
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Generation of the most recent request
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn raw_image(&self) -> &RawImage {
        &self.raw
    }

    #[must_use]
    pub fn raw_capacity(&self) -> usize {
        self.raw.capacity()
    }

    #[must_use]
    pub fn output_capacity(&self) -> usize {
        self.compositor.capacity()
    }

    /// Composite passes run by this session so far
    #[must_use]
    pub fn composite_passes(&self) -> u64 {
        self.compositor.passes()
    }

    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.timings
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn segmenter_name(&self) -> &str {
        self.segmenter.name()
    }

    fn ensure_not_busy(&self) -> Result<()> {
        match self.status {
            SessionStatus::Submitting { generation } => Err(CutoutError::SessionBusy {
                in_flight: generation,
            }),
            _ => Ok(()),
        }
    }

    fn reset_for_new_image(&mut self, source_label: Option<String>) {
        self.result = None;
        self.subject_index = 0;
        self.threshold = self.config.default_threshold;
        self.rotation = Rotation::Deg0;
        self.bounds = None;
        self.source_label = source_label;
        self.timings = ProcessingTimings::default();
    }

    fn fail(&mut self, reason: FailureReason) -> SessionOutcome {
        warn!(kind = reason.kind(), %reason, "Segmentation failed");
        self.status = SessionStatus::Failed(reason.clone());
        SessionOutcome::Failed(reason)
    }

    /// Move to `index` at `threshold`, keeping the current selection if the pass fails
    fn select(&mut self, index: usize, threshold: Threshold) -> Result<()> {
        let previous = (self.subject_index, self.threshold);
        (self.subject_index, self.threshold) = (index, threshold);
        if let Err(e) = self.recomposite() {
            (self.subject_index, self.threshold) = previous;
            // The failed pass overwrote the mask
            if self.recomposite().is_err() {
                self.bounds = None;
            }
            return Err(e);
        }
        Ok(())
    }

    fn recomposite(&mut self) -> Result<()> {
        let index = self.subject_index;
        let Some(subject) = self.result.as_mut().and_then(|r| r.subject_mut(index)) else {
            self.bounds = None;
            return Ok(());
        };

        let _span = span!(
            Level::DEBUG,
            "composite",
            subject = index,
            threshold = %self.threshold,
            width = subject.width,
            height = subject.height
        )
        .entered();
        let start = Instant::now();

        let output = self.compositor.composite(&self.raw, subject, self.threshold)?;
        self.bounds = output.bounds;
        self.timings.composite_ms = start.elapsed().as_millis() as u64;

        debug!(
            bounds = ?self.bounds,
            output_capacity = self.compositor.capacity(),
            "Composite complete"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SegmentationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationSession")
            .field("segmenter", &self.segmenter.name())
            .field("status", &self.status)
            .field("generation", &self.generation)
            .field("subject_index", &self.subject_index)
            .field("subject_count", &self.subject_count())
            .field("threshold", &self.threshold)
            .field("rotation", &self.rotation)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

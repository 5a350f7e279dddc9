//! Segmentation backend abstraction
//!
//! The segmentation model is an external collaborator: it receives a decoded image and,
//! asynchronously, reports either the subjects it found or a [`FailureReason`]. Each
//! subject carries a declared box in image coordinates and a rewindable confidence stream
//! covering exactly that box.

use crate::{
    confidence::ConfidenceStream,
    error::FailureReason,
    types::RawImage,
};
use async_trait::async_trait;

/// One candidate foreground region reported by a segmenter
pub struct Subject {
    pub start_x: u32,
    pub start_y: u32,
    pub width: u32,
    pub height: u32,
    confidence: Box<dyn ConfidenceStream>,
}

impl Subject {
    /// Create a subject from its declared box and confidence stream
    pub fn new(
        start_x: u32,
        start_y: u32,
        width: u32,
        height: u32,
        confidence: impl ConfidenceStream + 'static,
    ) -> Self {
        Self::from_boxed(start_x, start_y, width, height, Box::new(confidence))
    }

    #[must_use]
    pub fn from_boxed(
        start_x: u32,
        start_y: u32,
        width: u32,
        height: u32,
        confidence: Box<dyn ConfidenceStream>,
    ) -> Self {
        Self {
            start_x,
            start_y,
            width,
            height,
            confidence,
        }
    }

    /// Pixels inside the declared box
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the declared box lies entirely inside a `width × height` image
    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.start_x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.start_y) + u64::from(self.height) <= u64::from(height)
    }

    pub fn confidence(&self) -> &dyn ConfidenceStream {
        self.confidence.as_ref()
    }

    pub fn confidence_mut(&mut self) -> &mut dyn ConfidenceStream {
        self.confidence.as_mut()
    }
}

impl std::fmt::Debug for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("start_x", &self.start_x)
            .field("start_y", &self.start_y)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("confidence_len", &self.confidence.len())
            .finish()
    }
}

/// Ordered subjects for one image; empty means "no subjects found"
#[derive(Debug, Default)]
pub struct SegmentationResult {
    subjects: Vec<Subject>,
}

impl SegmentationResult {
    #[must_use]
    pub fn new(subjects: Vec<Subject>) -> Self {
        Self { subjects }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    #[must_use]
    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub(crate) fn subject_mut(&mut self, index: usize) -> Option<&mut Subject> {
        self.subjects.get_mut(index)
    }

    /// Check every subject against the image it was produced for
    ///
    /// # Errors
    /// Returns [`FailureReason::MalformedResult`] for boxes outside the image or
    /// confidence streams whose length differs from their box's pixel count.
    pub fn validate_against(&self, image: &RawImage) -> Result<(), FailureReason> {
        for (index, subject) in self.subjects.iter().enumerate() {
            if !subject.fits_within(image.width(), image.height()) {
                return Err(FailureReason::MalformedResult(format!(
                    "subject {} box ({}, {}) {}x{} exceeds {}x{} image",
                    index,
                    subject.start_x,
                    subject.start_y,
                    subject.width,
                    subject.height,
                    image.width(),
                    image.height()
                )));
            }
            if subject.confidence.len() != subject.pixel_count() {
                return Err(FailureReason::MalformedResult(format!(
                    "subject {} has {} confidence values for {} pixels",
                    index,
                    subject.confidence.len(),
                    subject.pixel_count()
                )));
            }
        }
        Ok(())
    }
}

/// Tagged result delivered once per segmentation request
pub type SegmentationOutcome = Result<SegmentationResult, FailureReason>;

/// Trait for segmentation backends
#[async_trait]
pub trait SubjectSegmenter: Send + Sync {
    /// Segment an image. Resolves exactly once; never partially.
    async fn submit(&self, image: &RawImage) -> SegmentationOutcome;

    /// Backend name for logs
    fn name(&self) -> &str;

    /// Whether the backend can accept requests right now
    fn is_ready(&self) -> bool {
        true
    }
}

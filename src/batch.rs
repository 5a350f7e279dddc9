//! Batch driver
//!
//! Walks one [`SegmentationSession`] over an ordered queue of image sources. Each step
//! runs until something needs the caller: a cutout is ready, an item failed, or the queue
//! is exhausted. Images without subjects are reported and skipped automatically.

use crate::{
    error::{FailureReason, Result},
    services::{
        io::ImageSource,
        progress::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker},
    },
    session::{SegmentationSession, SessionOutcome},
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Final tallies for a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Items that produced a cutout
    pub processed: usize,
    /// Items with no subjects
    pub skipped: usize,
    /// Items left in a failed state
    pub failed: usize,
}

impl BatchStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Events a batch emits, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    MaskedImageReady { index: usize, subjects: usize },
    NoSubjectFound { index: usize },
    Failed { index: usize, reason: FailureReason },
    BatchFinished { stats: BatchStats },
}

impl BatchEvent {
    /// Queue position the event refers to; `None` for `BatchFinished`
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::MaskedImageReady { index, .. }
            | Self::NoSubjectFound { index }
            | Self::Failed { index, .. } => Some(*index),
            Self::BatchFinished { .. } => None,
        }
    }
}

impl fmt::Display for BatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaskedImageReady { index, subjects } => {
                write!(f, "#{} ready ({} subject(s))", index, subjects)
            },
            Self::NoSubjectFound { index } => write!(f, "#{} has no subjects, skipped", index),
            Self::Failed { index, reason } => write!(f, "#{} failed: {}", index, reason),
            Self::BatchFinished { stats } => write!(
                f,
                "Batch finished: {} processed, {} skipped, {} failed",
                stats.processed, stats.skipped, stats.failed
            ),
        }
    }
}

/// Drives a session across a queue of image sources
pub struct BatchController {
    session: SegmentationSession,
    sources: Vec<ImageSource>,
    reporter: Arc<dyn ProgressReporter>,
    /// Next queue position to start
    cursor: usize,
    current: Option<usize>,
    current_failed: bool,
    finished: bool,
    stats: BatchStats,
}

impl BatchController {
    pub fn new(session: SegmentationSession, sources: Vec<ImageSource>) -> Self {
        Self {
            session,
            sources,
            reporter: Arc::new(NoOpProgressReporter),
            cursor: 0,
            current: None,
            current_failed: false,
            finished: false,
            stats: BatchStats::default(),
        }
    }

    /// Send every event and stage update to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Advance to the next image and process until a stopping event.
    ///
    /// Returns `Ok(None)` once `BatchFinished` has been emitted.
    pub async fn next_image(&mut self) -> Result<Option<BatchEvent>> {
        self.advance().await
    }

    /// Give up on the current item and move on
    pub async fn skip(&mut self) -> Result<Option<BatchEvent>> {
        self.advance().await
    }

    /// Reprocess the current item after a failure. `Ok(None)` when it has not failed.
    pub async fn retry(&mut self) -> Result<Option<BatchEvent>> {
        let Some(index) = self.current.filter(|_| self.current_failed && !self.finished) else {
            return Ok(None);
        };
        tracing::info!(index, "Retrying batch item");
        self.current_failed = false;

        match self.process_item(index).await? {
            BatchEvent::NoSubjectFound { .. } => self.advance().await,
            event => Ok(Some(event)),
        }
    }

    async fn advance(&mut self) -> Result<Option<BatchEvent>> {
        if self.finished {
            return Ok(None);
        }
        if std::mem::take(&mut self.current_failed) {
            self.stats.failed += 1;
        }

        while self.cursor < self.sources.len() {
            let index = self.cursor;
            self.cursor += 1;
            self.current = Some(index);

            match self.process_item(index).await? {
                BatchEvent::NoSubjectFound { .. } => continue,
                event => return Ok(Some(event)),
            }
        }

        self.finished = true;
        self.current = None;
        let event = BatchEvent::BatchFinished { stats: self.stats };
        tracing::info!(
            processed = self.stats.processed,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            "Batch finished"
        );
        self.reporter.report_batch_event(&event);
        Ok(Some(event))
    }

    async fn process_item(&mut self, index: usize) -> Result<BatchEvent> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        let source = self
            .sources
            .get(index)
            .cloned()
            .ok_or_else(|| crate::error::CutoutError::processing("Batch index out of range"))?;

        tracker.report_stage_with_description(
            ProcessingStage::ImageLoading,
            format!("Loading {}", source),
        );
        let outcome = self.session.process(&source).await?;

        let event = match outcome {
            SessionOutcome::SubjectsFound(subjects) => {
                self.stats.processed += 1;
                tracker.report_stage_with_description(
                    ProcessingStage::Compositing,
                    format!("Masked subject 1 of {}", subjects),
                );
                tracker.report_completion(self.session.timings().clone());
                BatchEvent::MaskedImageReady { index, subjects }
            },
            SessionOutcome::NoSubjects => {
                self.stats.skipped += 1;
                tracker.report_stage_with_description(
                    ProcessingStage::Segmentation,
                    format!("No subjects in {}", source),
                );
                BatchEvent::NoSubjectFound { index }
            },
            SessionOutcome::Failed(reason) => {
                self.current_failed = true;
                tracker.report_stage(ProcessingStage::Segmentation);
                tracker.report_error(&reason.to_string());
                BatchEvent::Failed { index, reason }
            },
        };

        self.reporter.report_batch_event(&event);
        Ok(event)
    }

    #[must_use]
    pub fn session(&self) -> &SegmentationSession {
        &self.session
    }

    /// Mutable access for subject/threshold navigation on the current item
    pub fn session_mut(&mut self) -> &mut SegmentationSession {
        &mut self.session
    }

    /// Queue position of the item the session currently holds
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    #[must_use]
    pub fn current_source(&self) -> Option<&ImageSource> {
        self.sources.get(self.current?)
    }

    /// Items not yet started
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.sources.len().saturating_sub(self.cursor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }
}

impl fmt::Debug for BatchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchController")
            .field("len", &self.sources.len())
            .field("cursor", &self.cursor)
            .field("current", &self.current)
            .field("current_failed", &self.current_failed)
            .field("finished", &self.finished)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

//! Progress reporting service
//!
//! Separates progress reporting from the session and batch logic so that frontends can
//! plug in their own handling.

use crate::{batch::BatchEvent, types::ProcessingTimings};
use instant::Instant;
use std::sync::Arc;

/// Progress stages while producing one cutout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Reading and decoding the image source
    ImageLoading,
    /// Waiting on the segmentation backend
    Segmentation,
    /// Masking the selected subject
    Compositing,
    /// Cropping, rotating and encoding the cutout
    Exporting,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::Segmentation => "Finding subjects",
            ProcessingStage::Compositing => "Masking subject",
            ProcessingStage::Exporting => "Exporting cutout",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ImageLoading => 10,
            ProcessingStage::Segmentation => 60,
            ProcessingStage::Compositing => 85,
            ProcessingStage::Exporting => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_description(stage, stage.description().to_string(), start_time)
    }

    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Trait for reporting progress during cutout operations
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);

    /// Report a batch-level event; every event a batch emits passes through here
    fn report_batch_event(&self, event: &BatchEvent) {
        let _ = event;
    }
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs through the `log` facade
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// # Arguments
    /// * `verbose` - Whether to show every stage and detailed timings
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        log::info!("✅ Cutout ready in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Image decode: {}ms", timings.image_decode_ms);
            log::info!("    • Segmentation: {}ms", timings.segmentation_ms);
            log::info!("    • Composite: {}ms", timings.composite_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }

    fn report_batch_event(&self, event: &BatchEvent) {
        match event {
            BatchEvent::Failed { .. } => log::warn!("{}", event),
            BatchEvent::BatchFinished { .. } => log::info!("🏁 {}", event),
            _ => {
                if self.verbose {
                    log::info!("{}", event);
                }
            },
        }
    }
}

/// Progress tracker that manages timing and progress reporting for one item
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter (for testing/disabled progress)
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Arc::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report progress with custom description
    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        self.reporter.report_progress(ProgressUpdate::with_description(
            stage,
            description,
            self.start_time,
        ));
    }

    pub fn report_completion(&self, timings: ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the most recent stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::ImageLoading);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("elapsed_ms", &self.elapsed_ms())
            .field("current_stage", &self.current_stage)
            .finish_non_exhaustive()
    }
}

//! Scripted segmenter for tests and demos
//!
//! `MockSegmenter` replays queued outcomes in order. Once the script runs out it falls back
//! to a single full-frame subject with a radial confidence falloff, so tests that only care
//! about the pipeline shape need no setup.

use crate::{
    confidence::ConfidenceMap,
    error::FailureReason,
    segmentation::{SegmentationOutcome, SegmentationResult, Subject, SubjectSegmenter},
    types::RawImage,
};
use async_trait::async_trait;
use instant::Duration;
use ndarray::Array2;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

/// Mock segmentation backend
#[derive(Debug, Clone)]
pub struct MockSegmenter {
    /// Outcomes returned by successive `submit` calls
    script: Arc<Mutex<VecDeque<SegmentationOutcome>>>,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    /// Simulated model latency
    latency: Option<Duration>,
    /// Whether the backend reports itself ready
    ready: bool,
}

impl MockSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
            latency: None,
            ready: true,
        }
    }

    /// Mock that replays `outcomes` in order
    #[must_use]
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = SegmentationOutcome>) -> Self {
        let mock = Self::new();
        for outcome in outcomes {
            mock.push_outcome(outcome);
        }
        mock
    }

    /// Mock whose `is_ready` returns false, as while a model is still downloading
    #[must_use]
    pub fn new_unavailable() -> Self {
        let mut mock = Self::new();
        mock.ready = false;
        mock
    }

    /// Sleep for `latency` before resolving each request
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_outcome(&self, outcome: SegmentationOutcome) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    pub fn push_subjects(&self, subjects: Vec<Subject>) {
        self.push_outcome(Ok(SegmentationResult::new(subjects)));
    }

    pub fn push_empty(&self) {
        self.push_outcome(Ok(SegmentationResult::empty()));
    }

    pub fn push_failure(&self, reason: FailureReason) {
        self.push_outcome(Err(reason));
    }

    /// Number of scripted outcomes not yet consumed
    #[must_use]
    pub fn pending(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Get the call history for verification in tests
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn clear_call_history(&self) {
        if let Ok(mut history) = self.call_history.lock() {
            history.clear();
        }
    }

    fn record_call(&self, call: String) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call);
        }
    }

    fn next_scripted(&self) -> Option<SegmentationOutcome> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }

    /// Full-frame subject: confidence 1.0 at the centre, falling to 0.0 at the inscribed circle
    fn radial_subject(width: u32, height: u32) -> Subject {
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 2.0).max(1.0);

        let values = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            let dx = x as f32 + 0.5 - center_x;
            let dy = y as f32 + 0.5 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();
            ((radius - distance) / radius).clamp(0.0, 1.0)
        });

        Subject::new(0, 0, width, height, ConfidenceMap::new(values))
    }
}

impl Default for MockSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubjectSegmenter for MockSegmenter {
    async fn submit(&self, image: &RawImage) -> SegmentationOutcome {
        self.record_call(format!("submit {}x{}", image.width(), image.height()));

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.next_scripted() {
            Some(outcome) => outcome,
            None => Ok(SegmentationResult::new(vec![Self::radial_subject(
                image.width(),
                image.height(),
            )])),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

//! Bridge for callback-style segmentation models
//!
//! Platform segmentation APIs usually take a request plus a completion handler and call
//! it later on their own thread. `CallbackSegmenter` adapts that shape to the async
//! [`SubjectSegmenter`] trait through a oneshot channel.

use crate::{
    error::FailureReason,
    segmentation::{SegmentationOutcome, SubjectSegmenter},
    types::RawImage,
};
use async_trait::async_trait;
use futures::channel::oneshot;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Single-use completion handle given to the wrapped model.
///
/// Consuming `complete` enforces exactly-once delivery; dropping the handle without calling
/// it resolves the request as [`FailureReason::ModelUnavailable`].
#[derive(Debug)]
pub struct SegmentationCompletion {
    sender: oneshot::Sender<SegmentationOutcome>,
}

impl SegmentationCompletion {
    /// Deliver the outcome. Returns false when the requester has already gone away.
    pub fn complete(self, outcome: SegmentationOutcome) -> bool {
        self.sender.send(outcome).is_ok()
    }

    /// Whether the requester has stopped waiting
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.sender.is_canceled()
    }
}

type ModelFn = dyn Fn(&RawImage, SegmentationCompletion) + Send + Sync;

/// Async adapter around a callback-style model
#[derive(Clone)]
pub struct CallbackSegmenter {
    name: String,
    model: Arc<ModelFn>,
    ready: Arc<AtomicBool>,
}

impl CallbackSegmenter {
    /// Wrap `model`, which must eventually complete (or drop) the handle it is given
    pub fn new<F>(name: impl Into<String>, model: F) -> Self
    where
        F: Fn(&RawImage, SegmentationCompletion) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            model: Arc::new(model),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the model as available or not (e.g. while weights are downloading)
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }
}

impl std::fmt::Debug for CallbackSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSegmenter")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SubjectSegmenter for CallbackSegmenter {
    async fn submit(&self, image: &RawImage) -> SegmentationOutcome {
        let (sender, receiver) = oneshot::channel();
        (self.model)(image, SegmentationCompletion { sender });

        match receiver.await {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => {
                tracing::warn!(backend = %self.name, "Completion handle dropped without a result");
                Err(FailureReason::ModelUnavailable(format!(
                    "{} dropped the request without completing it",
                    self.name
                )))
            },
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

//! Segmentation backends
//!
//! - `BorderKeySegmenter`: pure-Rust segmenter keyed on the border colour
//! - `CallbackSegmenter`: adapter for callback-style external models
//! - `MockSegmenter`: scripted backend for tests and demos

pub mod border_key;
pub mod callback;
pub mod mock;

pub use self::border_key::{BorderKeyConfig, BorderKeySegmenter};
pub use self::callback::{CallbackSegmenter, SegmentationCompletion};
pub use self::mock::MockSegmenter;

//! Core types for subject cutout operations

use crate::buffer::PixelBuffer;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Confidence cutoff, quantized to tenths in `[0.1, 0.9]`.
///
/// Stored as a step count so that every value is exactly on a step and repeated
/// increments never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Threshold(u8);

impl Threshold {
    const MIN_STEPS: u8 = 1;
    const MAX_STEPS: u8 = 9;

    /// Lowest threshold (0.1)
    pub const MIN: Self = Self(Self::MIN_STEPS);
    /// Highest threshold (0.9)
    pub const MAX: Self = Self(Self::MAX_STEPS);
    /// Default threshold (0.6)
    pub const DEFAULT: Self = Self(6);

    /// Snap an arbitrary value to the nearest valid step
    #[must_use]
    pub fn snapped(value: f32) -> Self {
        if value.is_nan() {
            return Self::DEFAULT;
        }
        let steps = (value * 10.0)
            .round()
            .clamp(f32::from(Self::MIN_STEPS), f32::from(Self::MAX_STEPS));
        Self(steps as u8)
    }

    /// Threshold as a float, e.g. `0.6`
    #[must_use]
    pub fn value(self) -> f32 {
        f32::from(self.0) / 10.0
    }

    /// Number of tenths, `1..=9`
    #[must_use]
    pub fn steps(self) -> u8 {
        self.0
    }

    /// One step up, or `None` at the upper bound
    #[must_use]
    pub fn raised(self) -> Option<Self> {
        (self.0 < Self::MAX_STEPS).then(|| Self(self.0 + 1))
    }

    /// One step down, or `None` at the lower bound
    #[must_use]
    pub fn lowered(self) -> Option<Self> {
        (self.0 > Self::MIN_STEPS).then(|| Self(self.0 - 1))
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.value())
    }
}

impl TryFrom<f32> for Threshold {
    type Error = String;

    fn try_from(value: f32) -> std::result::Result<Self, Self::Error> {
        if !(0.05..=0.95).contains(&value) {
            return Err(format!("threshold {} is outside 0.1-0.9", value));
        }
        Ok(Self::snapped(value))
    }
}

impl From<Threshold> for f32 {
    fn from(threshold: Threshold) -> Self {
        threshold.value()
    }
}

/// Tight, inclusive bounding box of the pixels that passed the threshold.
///
/// Coordinates are local to the subject's declared box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x + 1).max(0) as u32
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y + 1).max(0) as u32
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

/// Result of a tight-bounds computation: `None` when no pixel passed the threshold
pub type TightBounds = Option<BoundingBox>;

/// Orientation applied at export time, cycled in 90° steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Rotate a further 90° clockwise
    #[must_use]
    pub fn clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    /// Rotate a further 90° counter-clockwise
    #[must_use]
    pub fn counter_clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg270,
            Self::Deg90 => Self::Deg0,
            Self::Deg180 => Self::Deg90,
            Self::Deg270 => Self::Deg180,
        }
    }

    #[must_use]
    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Parse a multiple of 90 (negative values rotate counter-clockwise)
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        Some(match degrees.rem_euclid(360) {
            0 => Self::Deg0,
            90 => Self::Deg90,
            180 => Self::Deg180,
            _ => Self::Deg270,
        })
    }

    /// Whether width and height swap under this rotation
    #[must_use]
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Decoded source photograph held by a session
#[derive(Debug, Clone, Default)]
pub struct RawImage {
    pixels: PixelBuffer,
}

impl RawImage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a raw image from an RGBA image (allocates)
    #[must_use]
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let mut raw = Self::new();
        raw.load(image);
        raw
    }

    /// Replace the contents, reusing the existing storage when it is large enough
    pub fn load(&mut self, image: &RgbaImage) {
        self.pixels.load_rgba(image);
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pixels.capacity()
    }
}

/// Timing breakdown for one image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Reading and decoding the image source
    pub image_decode_ms: u64,
    /// Waiting on the segmenter
    pub segmentation_ms: u64,
    /// Most recent compositor pass
    pub composite_ms: u64,
    /// Decode through first composite
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent waiting on the segmenter
    #[must_use]
    pub fn segmentation_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.segmentation_ms as f64 / self.total_ms as f64
        }
    }

    /// Single-line summary for logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Decode: {}ms | Segmentation: {}ms | Composite: {}ms",
            self.total_ms, self.image_decode_ms, self.segmentation_ms, self.composite_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_snapping() {
        assert_eq!(Threshold::snapped(0.62), Threshold::DEFAULT);
        assert_eq!(Threshold::snapped(0.0), Threshold::MIN);
        assert_eq!(Threshold::snapped(1.0), Threshold::MAX);
        assert_eq!(Threshold::snapped(-3.0), Threshold::MIN);
        assert_eq!(Threshold::snapped(f32::NAN), Threshold::DEFAULT);
        assert_eq!(Threshold::snapped(0.349).steps(), 3);
    }

    #[test]
    fn test_threshold_default_matches_literal() {
        assert_eq!(Threshold::DEFAULT.value(), 0.6_f32);
        assert_eq!(Threshold::MIN.value(), 0.1_f32);
        assert_eq!(Threshold::MAX.value(), 0.9_f32);
        assert_eq!(Threshold::DEFAULT.to_string(), "0.6");
    }

    #[test]
    fn test_threshold_bounds() {
        assert_eq!(Threshold::MAX.raised(), None);
        assert_eq!(Threshold::MIN.lowered(), None);
        assert_eq!(Threshold::DEFAULT.raised().unwrap().steps(), 7);
        assert_eq!(Threshold::DEFAULT.lowered().unwrap().steps(), 5);
    }

    #[test]
    fn test_threshold_serde() {
        let json = serde_json::to_string(&Threshold::snapped(0.3)).unwrap();
        assert_eq!(json, "0.3");
        let parsed: Threshold = serde_json::from_str("0.7").unwrap();
        assert_eq!(parsed.steps(), 7);
        assert!(serde_json::from_str::<Threshold>("1.5").is_err());
    }

    #[test]
    fn test_bounding_box_dimensions() {
        let bbox = BoundingBox::new(2, 3, 5, 3);
        assert_eq!(bbox.width(), 4);
        assert_eq!(bbox.height(), 1);
        assert_eq!(bbox.area(), 4);
        assert!(bbox.contains(5, 3));
        assert!(!bbox.contains(6, 3));
    }

    #[test]
    fn test_rotation_cycles() {
        let mut rotation = Rotation::Deg0;
        for _ in 0..4 {
            rotation = rotation.clockwise();
        }
        assert_eq!(rotation, Rotation::Deg0);

        assert_eq!(Rotation::Deg0.counter_clockwise(), Rotation::Deg270);
        assert_eq!(Rotation::Deg90.clockwise().counter_clockwise(), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert!(Rotation::Deg270.swaps_dimensions());
    }

    #[test]
    fn test_timing_summary() {
        let timings = ProcessingTimings {
            image_decode_ms: 5,
            segmentation_ms: 50,
            composite_ms: 20,
            total_ms: 100,
        };
        assert!((timings.segmentation_ratio() - 0.5).abs() < f64::EPSILON);
        assert!(timings.summary().contains("Segmentation: 50ms"));
    }
}

//! Border-keyed segmentation
//!
//! A model-free segmenter for product shots and scans: the background colour is estimated
//! from the image border, each pixel's confidence grows with its colour distance from that
//! background, and every 4-connected foreground region becomes one subject.

use crate::{
    buffer::unpack_rgba,
    confidence::ConfidenceMap,
    error::{CutoutError, FailureReason, Result},
    segmentation::{SegmentationOutcome, SegmentationResult, Subject, SubjectSegmenter},
    types::RawImage,
};
use async_trait::async_trait;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Smallest image the border estimate is meaningful for
const MIN_DIMENSION: u32 = 3;

/// Largest RGB distance, used to normalise distances into `0.0..=1.0`
const MAX_RGB_DISTANCE: f32 = 441.672_94; // sqrt(3) * 255

/// Tuning for [`BorderKeySegmenter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderKeyConfig {
    /// Normalised colour distance at or below which a pixel is pure background
    pub tolerance: f32,
    /// Distance over which confidence ramps from 0 to 1 past the tolerance
    pub softness: f32,
    /// Components smaller than this many pixels are discarded as noise
    pub min_area: usize,
}

impl Default for BorderKeyConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.12,
            softness: 0.2,
            min_area: 16,
        }
    }
}

impl BorderKeyConfig {
    /// Build a validated configuration
    ///
    /// # Errors
    /// Returns `CutoutError::InvalidConfig` when a parameter is out of range.
    pub fn new(tolerance: f32, softness: f32, min_area: usize) -> Result<Self> {
        let config = Self {
            tolerance,
            softness,
            min_area,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `CutoutError::InvalidConfig` when `tolerance` is outside `0.0..1.0` or
    /// `softness` is outside `0.0..=1.0`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.tolerance) {
            return Err(CutoutError::config_value_error(
                "tolerance",
                self.tolerance,
                "0.0-1.0 (exclusive)",
            ));
        }
        if !(0.0..=1.0).contains(&self.softness) {
            return Err(CutoutError::config_value_error(
                "softness",
                self.softness,
                "0.0-1.0",
            ));
        }
        Ok(())
    }

    #[inline]
    fn confidence(&self, distance: f32) -> f32 {
        if distance <= self.tolerance {
            0.0
        } else if self.softness == 0.0 {
            1.0
        } else {
            ((distance - self.tolerance) / self.softness).min(1.0)
        }
    }
}

/// Connected foreground region found during labelling
#[derive(Debug, Clone, Copy)]
struct Component {
    label: u32,
    area: usize,
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl Component {
    fn new(label: u32, x: usize, y: usize) -> Self {
        Self {
            label,
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: usize, y: usize) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Pure-Rust segmenter keyed on the border colour
#[derive(Debug, Clone, Default)]
pub struct BorderKeySegmenter {
    config: BorderKeyConfig,
}

impl BorderKeySegmenter {
    /// # Errors
    /// Returns `CutoutError::InvalidConfig` when the configuration is invalid.
    pub fn new(config: BorderKeyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &BorderKeyConfig {
        &self.config
    }

    /// Segment synchronously; `submit` delegates here
    pub fn segment(&self, image: &RawImage) -> SegmentationOutcome {
        let (width, height) = (image.width(), image.height());
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(FailureReason::ImageNotRecognized(format!(
                "{}x{} is below the {}x{} minimum",
                width, height, MIN_DIMENSION, MIN_DIMENSION
            )));
        }

        let pixels = image.pixels().as_slice();
        let (w, h) = (width as usize, height as usize);
        let background = estimate_background(pixels, w, h);

        let confidence: Vec<f32> = pixels
            .iter()
            .map(|&pixel| {
                let [r, g, b, a] = unpack_rgba(pixel);
                if a == 0 {
                    return 0.0;
                }
                let distance = rgb_distance([r, g, b], background) / MAX_RGB_DISTANCE;
                self.config.confidence(distance)
            })
            .collect();

        let (labels, mut components) = label_components(&confidence, w, h);
        let found = components.len();
        components.retain(|c| c.area >= self.config.min_area);
        // Stable sort keeps scan order for equal areas
        components.sort_by(|a, b| b.area.cmp(&a.area));

        tracing::debug!(
            width,
            height,
            ?background,
            components = found,
            kept = components.len(),
            "Border-key segmentation complete"
        );

        let subjects = components
            .iter()
            .map(|component| subject_for(component, &labels, &confidence, w))
            .collect();
        Ok(SegmentationResult::new(subjects))
    }
}

#[async_trait]
impl SubjectSegmenter for BorderKeySegmenter {
    async fn submit(&self, image: &RawImage) -> SegmentationOutcome {
        self.segment(image)
    }

    fn name(&self) -> &str {
        "border-key"
    }
}

/// Mean RGB over the one-pixel frame of the image
fn estimate_background(pixels: &[u32], width: usize, height: usize) -> [f32; 3] {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    let mut add = |pixel: u32| {
        let [r, g, b, _] = unpack_rgba(pixel);
        sum[0] += u64::from(r);
        sum[1] += u64::from(g);
        sum[2] += u64::from(b);
        count += 1;
    };

    for (y, row) in pixels.chunks_exact(width).enumerate().take(height) {
        if y == 0 || y == height - 1 {
            row.iter().copied().for_each(&mut add);
        } else if let (Some(&first), Some(&last)) = (row.first(), row.last()) {
            add(first);
            add(last);
        }
    }

    let count = count.max(1) as f32;
    [
        sum[0] as f32 / count,
        sum[1] as f32 / count,
        sum[2] as f32 / count,
    ]
}

#[inline]
fn rgb_distance(rgb: [u8; 3], background: [f32; 3]) -> f32 {
    rgb.iter()
        .zip(background)
        .map(|(&channel, bg)| {
            let d = f32::from(channel) - bg;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Breadth-first 4-connected labelling of pixels with non-zero confidence.
/// Label 0 is background; components are returned in scan order.
fn label_components(confidence: &[f32], width: usize, height: usize) -> (Vec<u32>, Vec<Component>) {
    let is_foreground = |index: usize| confidence.get(index).is_some_and(|&c| c > 0.0);
    let mut labels = vec![0u32; confidence.len()];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..confidence.len() {
        if !is_foreground(start) {
            continue;
        }
        let Some(slot) = labels.get_mut(start).filter(|slot| **slot == 0) else {
            continue;
        };

        let label = components.len() as u32 + 1;
        let mut component = Component::new(label, start % width, start / width);
        *slot = label;
        queue.push_back(start);

        while let Some(index) = queue.pop_front() {
            let (x, y) = (index % width, index / width);
            component.include(x, y);

            let neighbours = [
                (x > 0).then(|| index - 1),
                (x + 1 < width).then(|| index + 1),
                (y > 0).then(|| index - width),
                (y + 1 < height).then(|| index + width),
            ];
            for neighbour in neighbours.into_iter().flatten() {
                if !is_foreground(neighbour) {
                    continue;
                }
                if let Some(slot) = labels.get_mut(neighbour).filter(|slot| **slot == 0) {
                    *slot = label;
                    queue.push_back(neighbour);
                }
            }
        }

        components.push(component);
    }

    (labels, components)
}

/// Confidence map over the component's box, zeroed outside the component itself
fn subject_for(component: &Component, labels: &[u32], confidence: &[f32], width: usize) -> Subject {
    let box_width = component.max_x - component.min_x + 1;
    let box_height = component.max_y - component.min_y + 1;

    let values = Array2::from_shape_fn((box_height, box_width), |(y, x)| {
        let index = (component.min_y + y) * width + component.min_x + x;
        match (labels.get(index), confidence.get(index)) {
            (Some(&label), Some(&value)) if label == component.label => value,
            _ => 0.0,
        }
    });

    Subject::new(
        component.min_x as u32,
        component.min_y as u32,
        box_width as u32,
        box_height as u32,
        ConfidenceMap::new(values),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceStream;
    use image::{Rgba, RgbaImage};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([200, 20, 20, 255]);

    fn fill(image: &mut RgbaImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgba<u8>) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                image.put_pixel(x, y, color);
            }
        }
    }

    fn segmenter(min_area: usize) -> BorderKeySegmenter {
        BorderKeySegmenter::new(BorderKeyConfig::new(0.1, 0.0, min_area).unwrap()).unwrap()
    }

    #[test]
    fn test_finds_subjects_largest_first() {
        let mut image = RgbaImage::from_pixel(20, 12, WHITE);
        fill(&mut image, 2, 2, 3, 3, RED);
        fill(&mut image, 10, 3, 6, 5, RED);

        let result = segmenter(1).segment(&RawImage::from_rgba(&image)).unwrap();
        assert_eq!(result.len(), 2);

        let largest = &result.subjects()[0];
        assert_eq!(
            (largest.start_x, largest.start_y, largest.width, largest.height),
            (10, 3, 6, 5)
        );
        let smaller = &result.subjects()[1];
        assert_eq!((smaller.start_x, smaller.start_y), (2, 2));
        assert_eq!(smaller.confidence().len(), 9);
    }

    #[test]
    fn test_min_area_filters_noise() {
        let mut image = RgbaImage::from_pixel(10, 10, WHITE);
        image.put_pixel(1, 1, RED);
        fill(&mut image, 4, 4, 4, 4, RED);

        let result = segmenter(4).segment(&RawImage::from_rgba(&image)).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.subjects()[0].start_x, 4);
    }

    #[test]
    fn test_uniform_image_has_no_subjects() {
        let image = RgbaImage::from_pixel(6, 6, WHITE);
        let result = segmenter(1).segment(&RawImage::from_rgba(&image)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_tiny_image_not_recognized() {
        let image = RgbaImage::from_pixel(2, 5, WHITE);
        assert!(matches!(
            segmenter(1).segment(&RawImage::from_rgba(&image)),
            Err(FailureReason::ImageNotRecognized(_))
        ));
    }

    #[test]
    fn test_confidence_zeroed_outside_component() {
        // An L shape: its box includes background pixels that must read as 0
        let mut image = RgbaImage::from_pixel(8, 8, WHITE);
        fill(&mut image, 2, 2, 1, 4, RED);
        fill(&mut image, 2, 5, 4, 1, RED);

        let mut result = segmenter(1).segment(&RawImage::from_rgba(&image)).unwrap();
        let subject = result.subject_mut(0).unwrap();
        assert_eq!((subject.width, subject.height), (4, 4));

        let stream = subject.confidence_mut();
        stream.rewind();
        let values: Vec<f32> = std::iter::from_fn(|| stream.next_value()).collect();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[1], 0.0);
        assert!(values[12..].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_label_components_on_edges_and_corners() {
        #[rustfmt::skip]
        let confidence = [
            1.0, 0.0, 0.0, 0.5,
            1.0, 0.0, 0.0, 0.5,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.9,
        ];
        let (labels, components) = label_components(&confidence, 4, 4);

        assert_eq!(components.len(), 3);
        assert_eq!(&labels[..4], &[1, 0, 0, 2]);
        assert_eq!(labels[4], 1);
        assert_eq!(labels[15], 3);
        assert_eq!(labels.iter().filter(|&&l| l == 0).count(), 11);
    }

    #[test]
    fn test_soft_ramp() {
        let config = BorderKeyConfig::new(0.1, 0.2, 1).unwrap();
        assert_eq!(config.confidence(0.05), 0.0);
        assert!((config.confidence(0.2) - 0.5).abs() < 1e-6);
        assert_eq!(config.confidence(0.9), 1.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(BorderKeyConfig::new(1.0, 0.1, 1).is_err());
        assert!(BorderKeyConfig::new(0.1, 1.5, 1).is_err());
        assert!(BorderKeyConfig::default().validate().is_ok());
    }
}

//! Subject mask compositing
//!
//! Turns a raw image, one subject's declared box and confidence stream, and a threshold
//! into a masked pixel buffer the size of the declared box plus the tight bounding box of
//! the pixels that passed.
//!
//! The pass is a single row-major walk that reads exactly one confidence value per pixel
//! in lockstep with the pixel loop. It is the dominant cost of the pipeline, so the inner
//! loop works on row slices and never allocates once the output and scratch buffers have
//! reached their high-water mark.

use crate::{
    buffer::{PixelBuffer, TRANSPARENT},
    error::{CutoutError, Result},
    segmentation::Subject,
    types::{BoundingBox, RawImage, Threshold, TightBounds},
};

/// Masked pixels and tight bounds of one composite pass.
///
/// Borrows the compositor's output buffer, so it must be consumed before the next pass.
#[derive(Debug, Clone, Copy)]
pub struct SubjectMaskOutput<'a> {
    pub pixels: &'a PixelBuffer,
    pub bounds: TightBounds,
}

/// Incremental tight-bounds tracker; starts empty rather than at sentinel coordinates
#[derive(Debug, Default, Clone, Copy)]
struct BoundsAccumulator {
    bounds: Option<BoundingBox>,
}

impl BoundsAccumulator {
    #[inline]
    fn include_row_span(&mut self, y: usize, first_x: usize, last_x: usize) {
        let (y, first_x, last_x) = (y as i32, first_x as i32, last_x as i32);
        self.bounds = Some(match self.bounds {
            None => BoundingBox::new(first_x, y, last_x, y),
            Some(b) => BoundingBox::new(b.min_x.min(first_x), b.min_y, b.max_x.max(last_x), y),
        });
    }

    fn finish(self) -> TightBounds {
        self.bounds
    }
}

/// Reusable compositor owning the output buffer and a one-row confidence scratch buffer
#[derive(Debug)]
pub struct SubjectMaskCompositor {
    output: PixelBuffer,
    scratch: Vec<f32>,
    transparent: u32,
    passes: u64,
}

impl Default for SubjectMaskCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl SubjectMaskCompositor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_transparent_color(TRANSPARENT)
    }

    /// Compositor writing `transparent` for pixels below the threshold
    #[must_use]
    pub fn with_transparent_color(transparent: u32) -> Self {
        Self {
            output: PixelBuffer::new(),
            scratch: Vec::new(),
            transparent,
            passes: 0,
        }
    }

    #[must_use]
    pub fn transparent_color(&self) -> u32 {
        self.transparent
    }

    /// Output buffer from the most recent pass
    #[must_use]
    pub fn output(&self) -> &PixelBuffer {
        &self.output
    }

    /// Backing capacity of the output buffer
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.output.capacity()
    }

    /// Number of composite passes started, including rejected ones
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Mask `subject` out of `raw` at `threshold`.
    ///
    /// Pixels with confidence at or above the threshold copy the source colour and extend
    /// the tight bounds. Everything else becomes transparent, including NaN scores.
    ///
    /// # Errors
    /// - the subject's declared box does not fit inside `raw`
    /// - the confidence stream ends before the box is covered
    pub fn composite(
        &mut self,
        raw: &RawImage,
        subject: &mut Subject,
        threshold: Threshold,
    ) -> Result<SubjectMaskOutput<'_>> {
        self.passes += 1;
        if !subject.fits_within(raw.width(), raw.height()) {
            return Err(CutoutError::processing(format!(
                "Subject box ({}, {}) {}x{} exceeds {}x{} image",
                subject.start_x,
                subject.start_y,
                subject.width,
                subject.height,
                raw.width(),
                raw.height()
            )));
        }

        let width = subject.width as usize;
        let start_x = subject.start_x as usize;
        let start_y = subject.start_y as usize;
        let height = subject.height;
        let raw_width = raw.width() as usize;
        let cutoff = threshold.value();
        let transparent = self.transparent;

        self.output.reshape(subject.width, height);
        let stream = subject.confidence_mut();
        stream.rewind();

        if self.output.is_empty() {
            return Ok(SubjectMaskOutput {
                pixels: &self.output,
                bounds: None,
            });
        }

        if self.scratch.len() < width {
            self.scratch.resize(width, 0.0);
        }
        let scratch = self
            .scratch
            .get_mut(..width)
            .ok_or_else(|| CutoutError::processing("Scratch row shorter than subject width"))?;

        let src = raw.pixels().as_slice();
        let mut bounds = BoundsAccumulator::default();

        for (y, dst_row) in self.output.as_mut_slice().chunks_exact_mut(width).enumerate() {
            let src_start = (start_y + y) * raw_width + start_x;
            let src_row = src
                .get(src_start..src_start + width)
                .ok_or_else(|| CutoutError::processing("Source row out of range"))?;

            if stream.read_into(scratch) < width {
                return Err(CutoutError::processing(format!(
                    "Confidence stream ended at row {} of {}",
                    y, height
                )));
            }

            let mut first_x = None;
            let mut last_x = 0;
            for (x, ((out, &pixel), &confidence)) in dst_row
                .iter_mut()
                .zip(src_row)
                .zip(scratch.iter())
                .enumerate()
            {
                if confidence >= cutoff {
                    *out = pixel;
                    first_x.get_or_insert(x);
                    last_x = x;
                } else {
                    *out = transparent;
                }
            }

            if let Some(first_x) = first_x {
                bounds.include_row_span(y, first_x, last_x);
            }
        }

        Ok(SubjectMaskOutput {
            pixels: &self.output,
            bounds: bounds.finish(),
        })
    }
}

//! Reusable packed-RGBA pixel storage
//!
//! A [`PixelBuffer`] separates its backing capacity from its logical `(width, height)`.
//! Storage only ever grows: processing a small image after a large one shrinks the
//! logical dimensions but keeps the allocation at its high-water mark, so a session that
//! walks through many multi-megapixel photos does not reallocate on every image.

use crate::error::{CutoutError, Result};
use image::RgbaImage;

/// Fully transparent black, the default colour written for rejected pixels
pub const TRANSPARENT: u32 = 0;

/// Pack an RGBA quadruple into a single `u32` (little-endian byte order: R, G, B, A)
#[inline]
#[must_use]
pub fn pack_rgba(rgba: [u8; 4]) -> u32 {
    u32::from_le_bytes(rgba)
}

/// Unpack a `u32` produced by [`pack_rgba`]
#[inline]
#[must_use]
pub fn unpack_rgba(pixel: u32) -> [u8; 4] {
    pixel.to_le_bytes()
}

/// Growable, never-shrinking buffer of packed pixels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    /// Backing storage; its length is the buffer's capacity
    pixels: Vec<u32>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Create an empty buffer with no backing storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer already shaped to `width × height`, filled with [`TRANSPARENT`]
    #[must_use]
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        let mut buffer = Self::new();
        buffer.reshape(width, height);
        buffer
    }

    /// Make sure at least `needed` pixels of backing storage exist.
    ///
    /// No-op when the current capacity suffices. Otherwise the storage is replaced by one
    /// of exactly `needed` pixels; existing contents are not preserved.
    pub fn ensure_capacity(&mut self, needed: usize) {
        if self.pixels.len() >= needed {
            return;
        }
        tracing::trace!(
            old_capacity = self.pixels.len(),
            new_capacity = needed,
            "growing pixel buffer"
        );
        self.pixels = vec![TRANSPARENT; needed];
    }

    /// Set the logical dimensions, growing the storage if required
    pub fn reshape(&mut self, width: u32, height: u32) {
        self.ensure_capacity(width as usize * height as usize);
        self.width = width;
        self.height = height;
    }

    /// Number of pixels the backing storage can hold
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pixels.len()
    }

    /// Logical pixel count (`width * height`)
    #[must_use]
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Logical pixels in row-major order
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        self.pixels.get(..self.len()).unwrap_or_default()
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u32] {
        let len = self.len();
        self.pixels.get_mut(..len).unwrap_or_default()
    }

    /// Pixel at `(x, y)`, or `None` outside the logical dimensions
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.as_slice()
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// One logical row
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[u32]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        self.as_slice().get(start..start + self.width as usize)
    }

    /// Copy an RGBA image into this buffer, reusing storage where possible
    pub fn load_rgba(&mut self, image: &RgbaImage) {
        let (width, height) = image.dimensions();
        self.reshape(width, height);
        for (dst, src) in self
            .as_mut_slice()
            .iter_mut()
            .zip(image.as_raw().chunks_exact(4))
        {
            *dst = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        }
    }

    /// Copy the logical pixels out into a new RGBA image
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        let mut raw = Vec::with_capacity(self.len() * 4);
        for &pixel in self.as_slice() {
            raw.extend_from_slice(&unpack_rgba(pixel));
        }
        RgbaImage::from_raw(self.width, self.height, raw)
            .ok_or_else(|| CutoutError::processing("Pixel buffer does not match its dimensions"))
    }

    /// Copy the inclusive rectangle `(min_x, min_y)..=(max_x, max_y)` into a new RGBA image
    pub fn crop_to_rgba(&self, min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Result<RgbaImage> {
        if min_x > max_x || min_y > max_y || max_x >= self.width || max_y >= self.height {
            return Err(CutoutError::processing(format!(
                "Crop rectangle ({}, {})..=({}, {}) is outside a {}x{} buffer",
                min_x, min_y, max_x, max_y, self.width, self.height
            )));
        }
        let crop_width = max_x - min_x + 1;
        let crop_height = max_y - min_y + 1;
        let mut raw = Vec::with_capacity(crop_width as usize * crop_height as usize * 4);
        for y in min_y..=max_y {
            let row = self
                .row(y)
                .and_then(|row| row.get(min_x as usize..=max_x as usize))
                .ok_or_else(|| CutoutError::processing("Crop row out of range"))?;
            for &pixel in row {
                raw.extend_from_slice(&unpack_rgba(pixel));
            }
        }
        RgbaImage::from_raw(crop_width, crop_height, raw)
            .ok_or_else(|| CutoutError::processing("Cropped buffer does not match its dimensions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip_byte_order() {
        let packed = pack_rgba([1, 2, 3, 4]);
        assert_eq!(packed, 0x0403_0201);
        assert_eq!(unpack_rgba(packed), [1, 2, 3, 4]);
        assert_eq!(pack_rgba([0, 0, 0, 0]), TRANSPARENT);
    }

    #[test]
    fn test_ensure_capacity_grows_exactly() {
        let mut buffer = PixelBuffer::new();
        assert_eq!(buffer.capacity(), 0);

        buffer.ensure_capacity(100);
        assert_eq!(buffer.capacity(), 100);

        // Smaller request keeps storage
        buffer.ensure_capacity(10);
        assert_eq!(buffer.capacity(), 100);

        buffer.ensure_capacity(101);
        assert_eq!(buffer.capacity(), 101);
    }

    #[test]
    fn test_reshape_keeps_high_water_mark() {
        let mut buffer = PixelBuffer::with_dimensions(40, 25);
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.capacity(), 1000);

        buffer.reshape(5, 2);
        assert_eq!(buffer.dimensions(), (5, 2));
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.as_slice().len(), 10);
        assert_eq!(buffer.capacity(), 1000);
    }

    #[test]
    fn test_load_and_export_rgba() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgba([10, 20, 30, 255]));
        image.put_pixel(1, 0, image::Rgba([40, 50, 60, 128]));

        let mut buffer = PixelBuffer::new();
        buffer.load_rgba(&image);
        assert_eq!(buffer.get(0, 0), Some(pack_rgba([10, 20, 30, 255])));
        assert_eq!(buffer.get(1, 0), Some(pack_rgba([40, 50, 60, 128])));
        assert_eq!(buffer.get(2, 0), None);

        let back = buffer.to_rgba_image().unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_crop_to_rgba() {
        let mut buffer = PixelBuffer::with_dimensions(3, 3);
        for (i, pixel) in buffer.as_mut_slice().iter_mut().enumerate() {
            *pixel = pack_rgba([i as u8, 0, 0, 255]);
        }

        let crop = buffer.crop_to_rgba(1, 1, 2, 2).unwrap();
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(crop.get_pixel(0, 0)[0], 4);
        assert_eq!(crop.get_pixel(1, 1)[0], 8);

        assert!(buffer.crop_to_rgba(2, 0, 1, 0).is_err());
        assert!(buffer.crop_to_rgba(0, 0, 3, 0).is_err());
    }
}

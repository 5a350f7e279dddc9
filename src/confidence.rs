//! Sequential, rewindable per-pixel confidence sources
//!
//! Segmentation backends hand back one confidence score per pixel of a subject's
//! declared box, in row-major order. The compositor consumes a stream exactly once per
//! pass and rewinds it before the next pass; random access is not part of the contract.

use ndarray::Array2;
use std::sync::Arc;

/// One-directional source of confidence values for a subject
pub trait ConfidenceStream: Send + Sync {
    /// Restart from the first value
    fn rewind(&mut self);

    /// Next value, or `None` once the stream is exhausted
    fn next_value(&mut self) -> Option<f32>;

    /// Total number of values the stream yields after a rewind
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `dst` with the next `dst.len()` values, returning how many were written.
    ///
    /// Equivalent to calling [`next_value`](Self::next_value) once per slot; implementors
    /// backed by contiguous memory override it with a bulk copy.
    fn read_into(&mut self, dst: &mut [f32]) -> usize {
        let mut written = 0;
        for slot in dst.iter_mut() {
            match self.next_value() {
                Some(value) => {
                    *slot = value;
                    written += 1;
                },
                None => break,
            }
        }
        written
    }
}

/// Floating-point confidence map backed by a 2-D array (`rows = height`, `cols = width`)
#[derive(Debug, Clone)]
pub struct ConfidenceMap {
    values: Arc<Array2<f32>>,
    cursor: usize,
}

impl ConfidenceMap {
    /// Wrap an array; non-standard layouts are copied into row-major order
    #[must_use]
    pub fn new(values: Array2<f32>) -> Self {
        let values = if values.is_standard_layout() {
            values
        } else {
            values.as_standard_layout().into_owned()
        };
        Self {
            values: Arc::new(values),
            cursor: 0,
        }
    }

    /// Build from a flat row-major vector
    ///
    /// # Errors
    /// Returns an error when `values.len() != width * height`.
    pub fn from_vec(
        width: u32,
        height: u32,
        values: Vec<f32>,
    ) -> crate::error::Result<Self> {
        let array = Array2::from_shape_vec((height as usize, width as usize), values).map_err(
            |e| crate::error::CutoutError::processing(format!("Invalid confidence map: {}", e)),
        )?;
        Ok(Self::new(array))
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        let (rows, cols) = self.values.dim();
        (cols as u32, rows as u32)
    }

    fn flat(&self) -> &[f32] {
        self.values.as_slice().unwrap_or_default()
    }
}

impl ConfidenceStream for ConfidenceMap {
    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn next_value(&mut self) -> Option<f32> {
        let value = self.flat().get(self.cursor).copied()?;
        self.cursor += 1;
        Some(value)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn read_into(&mut self, dst: &mut [f32]) -> usize {
        let remaining = self.flat().get(self.cursor..).unwrap_or_default();
        let count = remaining.len().min(dst.len());
        if let (Some(dst), Some(src)) = (dst.get_mut(..count), remaining.get(..count)) {
            dst.copy_from_slice(src);
        }
        self.cursor += count;
        count
    }
}

/// 8-bit confidence mask (`0` = background, `255` = certain foreground)
///
/// Many segmentation models emit quantized masks; values are scaled to `0.0..=1.0` on read.
#[derive(Debug, Clone)]
pub struct QuantizedMask {
    data: Arc<[u8]>,
    cursor: usize,
}

impl QuantizedMask {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: data.into(),
            cursor: 0,
        }
    }

    #[inline]
    fn scale(value: u8) -> f32 {
        f32::from(value) / 255.0
    }
}

impl ConfidenceStream for QuantizedMask {
    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn next_value(&mut self) -> Option<f32> {
        let value = self.data.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(Self::scale(value))
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn read_into(&mut self, dst: &mut [f32]) -> usize {
        let remaining = self.data.get(self.cursor..).unwrap_or_default();
        let mut count = 0;
        for (slot, &value) in dst.iter_mut().zip(remaining) {
            *slot = Self::scale(value);
            count += 1;
        }
        self.cursor += count;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_confidence_map_sequential_and_rewind() {
        let mut map = ConfidenceMap::new(array![[0.1, 0.2], [0.3, 0.4]]);
        assert_eq!(map.len(), 4);
        assert_eq!(map.dimensions(), (2, 2));

        let drained: Vec<f32> = std::iter::from_fn(|| map.next_value()).collect();
        assert_eq!(drained, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(map.next_value(), None);

        map.rewind();
        assert_eq!(map.next_value(), Some(0.1));
    }

    #[test]
    fn test_confidence_map_read_into_is_row_major() {
        // Transposed view has a non-standard layout and must still read row-major
        let transposed = array![[1.0, 3.0], [2.0, 4.0]].reversed_axes();
        let mut map = ConfidenceMap::new(transposed);

        let mut row = [0.0; 3];
        assert_eq!(map.read_into(&mut row), 3);
        assert_eq!(row, [1.0, 2.0, 3.0]);
        assert_eq!(map.read_into(&mut row), 1);
        assert_eq!(row[0], 4.0);
        assert_eq!(map.read_into(&mut row), 0);
    }

    #[test]
    fn test_confidence_map_from_vec_validates_shape() {
        assert!(ConfidenceMap::from_vec(2, 2, vec![0.0; 4]).is_ok());
        assert!(ConfidenceMap::from_vec(2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_quantized_mask_scaling() {
        let mut mask = QuantizedMask::new(vec![0, 255, 153]);
        assert_eq!(mask.next_value(), Some(0.0));
        assert_eq!(mask.next_value(), Some(1.0));
        let value = mask.next_value().unwrap();
        assert!((value - 0.6).abs() < 1e-6);

        mask.rewind();
        let mut buf = [0.0; 8];
        assert_eq!(mask.read_into(&mut buf), 3);
    }

    #[test]
    fn test_default_read_into_uses_next_value() {
        struct Counter(u32);
        impl ConfidenceStream for Counter {
            fn rewind(&mut self) {
                self.0 = 0;
            }
            fn next_value(&mut self) -> Option<f32> {
                (self.0 < 3).then(|| {
                    self.0 += 1;
                    self.0 as f32
                })
            }
            fn len(&self) -> usize {
                3
            }
        }

        let mut counter = Counter(0);
        let mut buf = [0.0; 5];
        assert_eq!(counter.read_into(&mut buf), 3);
        assert_eq!(&buf[..3], &[1.0, 2.0, 3.0]);
    }
}

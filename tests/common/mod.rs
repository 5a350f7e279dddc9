//! Shared builders for integration tests

#![allow(dead_code)]

use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use subject_cutout::{
    ConfidenceMap, ImageSource, MockSegmenter, SegmentationSession, Subject,
};

/// Subject with a float confidence map over its declared box
pub fn subject(x: u32, y: u32, w: u32, h: u32, confidence: Vec<f32>) -> Subject {
    Subject::new(
        x,
        y,
        w,
        h,
        ConfidenceMap::from_vec(w, h, confidence).expect("confidence matches box"),
    )
}

/// Subject that passes every threshold everywhere in its box
pub fn solid_subject(x: u32, y: u32, w: u32, h: u32) -> Subject {
    subject(x, y, w, h, vec![1.0; (w * h) as usize])
}

/// Image with a distinct colour per pixel, so masks can be compared exactly
pub fn patterned(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8, 255])
    })
}

pub fn patterned_source(width: u32, height: u32) -> ImageSource {
    ImageSource::decoded(patterned(width, height))
}

/// Light background with solid dark rectangles, as `(x, y, w, h)`
pub fn blocks_on_white(width: u32, height: u32, blocks: &[(u32, u32, u32, u32)]) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([250, 250, 250, 255]));
    for &(bx, by, bw, bh) in blocks {
        for y in by..by + bh {
            for x in bx..bx + bw {
                image.put_pixel(x, y, Rgba([20, 40, 160, 255]));
            }
        }
    }
    image
}

pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("PNG encoding");
    bytes.into_inner()
}

pub fn session_with(mock: &MockSegmenter) -> SegmentationSession {
    SegmentationSession::new(Arc::new(mock.clone()))
}

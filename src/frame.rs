//! Pixel buffers handed to the detection pipeline.
//!
//! `Frame` is the crate's own 8-bit grayscale buffer. Real vision backends
//! may use their own frame type through `VisionPrimitives::Frame`; the
//! pipeline never looks inside a frame and never keeps one past the cycle
//! that received it.

use anyhow::{anyhow, Result};

/// Single-channel 8-bit image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    sequence: u64,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, sequence: u64, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame {}x{} needs {} pixels, got {}",
                width,
                height,
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            width,
            height,
            sequence,
            pixels,
        })
    }

    /// Uniform frame, mostly useful for tests.
    pub fn filled(width: u32, height: u32, sequence: u64, value: u8) -> Self {
        Self {
            width,
            height,
            sequence,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Capture order assigned by the source.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

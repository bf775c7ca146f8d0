//! Synthetic frame source.
//!
//! Produces grayscale frames with a bright square on a dark background.
//! Every `blank_every` frames the marker leaves the scene and the frame is
//! all black. Frames are paced to `target_fps` unless pacing is off.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Emit an all-black frame every N frames. Zero disables blanks.
    pub blank_every: u64,
    /// Sleep between frames to hold `target_fps`.
    pub paced: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 10,
            blank_every: 0,
            paced: true,
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub blank_frames: u64,
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    connected: bool,
    next_due: Option<Instant>,
    stats: SourceStats,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "synthetic source needs a non-empty frame, got {}x{}",
                config.width,
                config.height
            ));
        }
        if config.target_fps == 0 {
            return Err(anyhow!("synthetic source target_fps must be greater than zero"));
        }
        Ok(Self {
            config,
            connected: false,
            next_due: None,
            stats: SourceStats::default(),
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected ({}x{} @ {} fps)",
            self.config.width,
            self.config.height,
            self.config.target_fps
        );
        Ok(())
    }

    /// Capture the next frame, sleeping first if pacing is on.
    pub fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected"));
        }
        if self.config.paced {
            self.pace();
        }

        let sequence = self.stats.frames_captured;
        self.stats.frames_captured += 1;

        let blank = self.config.blank_every > 0 && (sequence + 1) % self.config.blank_every == 0;
        if blank {
            self.stats.blank_frames += 1;
            return Ok(Frame::filled(self.config.width, self.config.height, sequence, 0));
        }
        Frame::new(
            self.config.width,
            self.config.height,
            sequence,
            self.marker_pixels(),
        )
    }

    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.config.target_fps
    }

    fn pace(&mut self) {
        let interval = self.frame_interval();
        let now = Instant::now();
        match self.next_due {
            Some(due) if due > now => {
                std::thread::sleep(due - now);
                self.next_due = Some(due + interval);
            }
            _ => self.next_due = Some(now + interval),
        }
    }

    fn marker_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.config.width, self.config.height);
        let side = w.min(h) / 2;
        let (x0, y0) = ((w - side) / 2, (h - side) / 2);
        let mut pixels = vec![16u8; w as usize * h as usize];
        for y in y0..y0 + side {
            let row = (y * w) as usize;
            for x in x0..x0 + side {
                pixels[row + x as usize] = 240;
            }
        }
        pixels
    }
}

//! Rendering hooks driven by the pipeline.
//!
//! Actual widget drawing lives outside this crate. The pipeline only needs
//! to show an accepted glyph and outline square candidates.

use std::sync::{Arc, Mutex};

use crate::geometry::Point;
use crate::glyph::Glyph;

pub trait Renderer: Send {
    /// Show an accepted glyph.
    fn render_pattern(&mut self, glyph: &Glyph);

    /// Outline a square candidate on the live view.
    fn draw_outline(&mut self, points: &[Point]);

    /// Blank the pattern display.
    fn clear_pattern(&mut self);
}

/// Writes accepted glyphs to the log. Outlines are logged at trace level.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render_pattern(&mut self, glyph: &Glyph) {
        log::info!("pattern {}\n{}", glyph.to_row_string(), glyph);
    }

    fn draw_outline(&mut self, points: &[Point]) {
        log::trace!("outline {:?}", points);
    }

    fn clear_pattern(&mut self) {
        log::debug!("pattern cleared");
    }
}

/// Everything a `RecordingRenderer` has been asked to draw.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderLog {
    pub patterns: Vec<Glyph>,
    pub outlines: Vec<Vec<Point>>,
    pub clears: usize,
}

/// Renderer that records calls into a shared `RenderLog`.
#[derive(Clone, Debug, Default)]
pub struct RecordingRenderer {
    log: Arc<Mutex<RenderLog>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calls recorded so far.
    pub fn snapshot(&self) -> RenderLog {
        match self.log.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_log(&self, f: impl FnOnce(&mut RenderLog)) {
        match self.log.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl Renderer for RecordingRenderer {
    fn render_pattern(&mut self, glyph: &Glyph) {
        self.with_log(|log| log.patterns.push(*glyph));
    }

    fn draw_outline(&mut self, points: &[Point]) {
        self.with_log(|log| log.outlines.push(points.to_vec()));
    }

    fn clear_pattern(&mut self) {
        self.with_log(|log| log.clears += 1);
    }
}

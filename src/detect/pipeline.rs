//! Per-frame marker detection.
//!
//! Each frame runs through:
//! 1. grayscale, edges, fixed threshold, dilation
//! 2. blob extraction, largest first
//! 3. per blob: convex hull, quadrilateral test, square test, outline
//! 4. when not cooling down: corner canonicalization, unwarp, Otsu, invert,
//!    glyph decode
//! 5. confidence gate, debounce history, stability check
//! 6. on ACCEPT: render, lock for the cooldown, optional serial dispatch
//!
//! Nothing in here returns an error to the frame callback. A failing
//! primitive skips its candidate (or the frame, for step 1) and is counted.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use super::backend::{Blob, PolygonClass, VisionPrimitives};
use super::cooldown::{CooldownTimer, DetectionState, COOLDOWN};
use super::history::{DebounceHistory, STABLE_WINDOW};
use super::result::{FrameReport, PipelineStats};
use crate::clock::Clock;
use crate::gate::StartFlag;
use crate::geometry::{canonicalize_corners, CornerSet};
use crate::glyph::{Glyph, GRID_SIZE, MIN_CONFIDENCE};
use crate::output::OutputDispatcher;
use crate::render::Renderer;

/// Tunables for the detection pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Fixed threshold applied after edge detection.
    pub binarize_threshold: u8,
    pub min_blob_width: u32,
    pub min_blob_height: u32,
    /// Side of the rectified marker crop in pixels.
    pub unwarp_size: u32,
    pub min_confidence: f32,
    pub stable_window: usize,
    pub cooldown: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            binarize_threshold: 100,
            min_blob_width: 200,
            min_blob_height: 200,
            unwarp_size: 100,
            min_confidence: MIN_CONFIDENCE,
            stable_window: STABLE_WINDOW,
            cooldown: COOLDOWN,
        }
    }
}

pub struct DetectionPipeline<V: VisionPrimitives, R: Renderer> {
    vision: V,
    renderer: R,
    settings: PipelineSettings,
    start: StartFlag,
    cooldown: Arc<CooldownTimer>,
    history: DebounceHistory,
    output: Option<OutputDispatcher>,
    stats: PipelineStats,
}

impl<V: VisionPrimitives, R: Renderer> DetectionPipeline<V, R> {
    pub fn new(
        vision: V,
        renderer: R,
        settings: PipelineSettings,
        start: StartFlag,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cooldown = Arc::new(CooldownTimer::new(
            DetectionState::new(),
            clock,
            settings.cooldown,
        ));
        let history = DebounceHistory::new(settings.stable_window);
        Self {
            vision,
            renderer,
            settings,
            start,
            cooldown,
            history,
            output: None,
            stats: PipelineStats::default(),
        }
    }

    /// Forward every ACCEPT to the serial output. Off unless set.
    pub fn with_output(mut self, output: OutputDispatcher) -> Self {
        self.output = Some(output);
        self
    }

    pub fn output_enabled(&self) -> bool {
        self.output.is_some()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn history(&self) -> &DebounceHistory {
        &self.history
    }

    pub fn cooldown(&self) -> Arc<CooldownTimer> {
        self.cooldown.clone()
    }

    pub fn detection_state(&self) -> DetectionState {
        self.cooldown.state().clone()
    }

    pub fn vision(&self) -> &V {
        &self.vision
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Blank the pattern display for a new session. History and cooldown
    /// are left as they are.
    pub fn reset(&mut self) {
        self.renderer.clear_pattern();
    }

    /// Stop the serial worker after it drains queued glyphs.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.output.take() {
            Some(output) => output.shutdown(),
            None => Ok(()),
        }
    }

    /// Run one frame. The frame is only borrowed for this call.
    pub fn process_frame(&mut self, frame: &V::Frame) -> FrameReport {
        self.stats.frames += 1;
        if !self.start.is_open() {
            self.stats.frames_gated += 1;
            return FrameReport::gated();
        }
        self.cooldown.refresh();

        let mut report = FrameReport::default();
        let blobs = match self.find_candidates(frame) {
            Ok(blobs) => blobs,
            Err(e) => {
                log::debug!("frame preprocessing failed: {:#}", e);
                report.faults += 1;
                self.stats.faults += 1;
                return report;
            }
        };
        report.candidates = blobs.len();

        for blob in &blobs {
            if let Err(e) = self.process_candidate(frame, blob, &mut report) {
                log::debug!("candidate skipped: {:#}", e);
                report.faults += 1;
                self.stats.faults += 1;
            }
        }
        report
    }

    fn find_candidates(&self, frame: &V::Frame) -> Result<Vec<Blob>> {
        let mut work = self.vision.to_grayscale(frame)?;
        self.vision.detect_edges(&mut work)?;
        self.vision
            .binarize(&mut work, self.settings.binarize_threshold)?;
        self.vision.dilate(&mut work)?;
        self.vision.extract_blobs(
            &work,
            self.settings.min_blob_width,
            self.settings.min_blob_height,
        )
    }

    fn process_candidate(
        &mut self,
        frame: &V::Frame,
        blob: &Blob,
        report: &mut FrameReport,
    ) -> Result<()> {
        let hull = self.vision.convex_hull(blob.edge_points());
        let Some(corners) = self.vision.quadrilateral_corners(&hull) else {
            log::trace!("candidate hull with {} points is not a quadrilateral", hull.len());
            return Ok(());
        };
        let class = self.vision.classify_polygon(&corners);
        if class != PolygonClass::Square {
            log::trace!("quadrilateral classified as {:?}", class);
            return Ok(());
        }
        report.squares += 1;
        self.stats.squares += 1;

        let outcome = if self.cooldown.is_locked() {
            Ok(())
        } else {
            self.decode_candidate(frame, &corners, report)
        };

        self.renderer.draw_outline(&hull);
        outcome
    }

    fn decode_candidate(
        &mut self,
        frame: &V::Frame,
        corners: &CornerSet,
        report: &mut FrameReport,
    ) -> Result<()> {
        let canonical = canonicalize_corners(corners);
        let size = self.settings.unwarp_size;
        let mut crop = self
            .vision
            .unwarp_quadrilateral(frame, &canonical, size, size)?;
        self.vision.auto_threshold(&mut crop)?;
        self.vision.invert(&mut crop)?;

        report.decodes += 1;
        self.stats.decodes += 1;
        let reading = self.vision.decode_glyph(&crop, GRID_SIZE)?;
        drop(crop);

        if !reading.meets(self.settings.min_confidence) {
            self.stats.low_confidence += 1;
            log::trace!("decode confidence {:.3} below threshold", reading.confidence);
            return Ok(());
        }

        self.history.append(reading.glyph);
        report.recorded += 1;

        if !self.history.is_stable() {
            self.stats.unstable += 1;
            return Ok(());
        }

        self.accept(reading.glyph, reading.confidence, report);
        Ok(())
    }

    fn accept(&mut self, glyph: Glyph, confidence: f32, report: &mut FrameReport) {
        self.renderer.render_pattern(&glyph);
        self.cooldown.arm();
        self.stats.accepts += 1;
        report.accepted = Some(glyph);
        log::info!(
            "glyph accepted: {} conf={:.2} (accept #{})",
            glyph.to_row_string(),
            confidence,
            self.stats.accepts
        );

        if let Some(output) = self.output.as_ref() {
            if output.dispatch(glyph) {
                self.stats.outputs_dispatched += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::detect::StubVision;
    use crate::frame::Frame;
    use crate::geometry::Point;
    use crate::glyph::GlyphReading;
    use crate::render::RecordingRenderer;

    fn lit_frame(seq: u64) -> Frame {
        Frame::filled(16, 16, seq, 200)
    }

    fn pipeline(
        vision: StubVision,
        open: bool,
    ) -> (
        DetectionPipeline<StubVision, RecordingRenderer>,
        RecordingRenderer,
        Arc<ManualClock>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let renderer = RecordingRenderer::new();
        let start = StartFlag::new();
        if open {
            start.open();
        }
        let pipeline = DetectionPipeline::new(
            vision,
            renderer.clone(),
            PipelineSettings::default(),
            start,
            clock.clone(),
        );
        (pipeline, renderer, clock)
    }

    fn glyph() -> Glyph {
        "10001,01010,00100,01010,10001".parse().unwrap()
    }

    #[test]
    fn closed_gate_skips_everything() {
        let vision = StubVision::new(GlyphReading::new(glyph(), 0.9)).with_square(0, 0, 300);
        let decodes = vision.decode_counter();
        let (mut pipeline, renderer, _) = pipeline(vision, false);

        let report = pipeline.process_frame(&lit_frame(0));
        assert!(report.gated);
        assert_eq!(decodes.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(renderer.snapshot().outlines.is_empty());
        assert_eq!(pipeline.stats().frames_gated, 1);
    }

    #[test]
    fn confidence_gate_is_inclusive() {
        let vision = StubVision::new(GlyphReading::new(glyph(), 0.9)).with_square(0, 0, 300);
        vision.push_reading(GlyphReading::new(glyph(), 0.5999));
        vision.push_reading(GlyphReading::new(glyph(), 0.6));
        let (mut pipeline, _, _) = pipeline(vision, true);

        let report = pipeline.process_frame(&lit_frame(0));
        assert_eq!(report.decodes, 1);
        assert_eq!(report.recorded, 0);
        assert!(pipeline.history().is_empty());

        let report = pipeline.process_frame(&lit_frame(1));
        assert_eq!(report.recorded, 1);
        assert_eq!(pipeline.history().len(), 1);
    }

    #[test]
    fn non_square_is_skipped_without_outline() {
        let vision = StubVision::new(GlyphReading::new(glyph(), 0.9)).with_blob(&[
            Point::new(0, 0),
            Point::new(400, 0),
            Point::new(400, 200),
            Point::new(0, 200),
        ]);
        let (mut pipeline, renderer, _) = pipeline(vision, true);
        let report = pipeline.process_frame(&lit_frame(0));
        assert_eq!(report.candidates, 1);
        assert_eq!(report.squares, 0);
        assert_eq!(report.decodes, 0);
        assert!(renderer.snapshot().outlines.is_empty());
    }

    #[test]
    fn locked_pipeline_still_draws_outlines() {
        let vision = StubVision::new(GlyphReading::new(glyph(), 0.9)).with_square(0, 0, 300);
        let decodes = vision.decode_counter();
        let (mut pipeline, renderer, clock) = pipeline(vision, true);

        pipeline.process_frame(&lit_frame(0));
        let report = pipeline.process_frame(&lit_frame(1));
        assert_eq!(report.accepted, Some(glyph()));
        assert!(pipeline.detection_state().is_locked());

        clock.advance(Duration::from_millis(500));
        let report = pipeline.process_frame(&lit_frame(2));
        assert_eq!(report.squares, 1);
        assert_eq!(report.decodes, 0);
        assert_eq!(decodes.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(renderer.snapshot().outlines.len(), 3);
    }

    #[test]
    fn decode_failure_skips_only_that_candidate() {
        let vision = StubVision::new(GlyphReading::new(glyph(), 0.9))
            .with_square(0, 0, 400)
            .with_square(500, 0, 300);
        vision.push_failure("glare");
        let (mut pipeline, renderer, _) = pipeline(vision, true);

        let report = pipeline.process_frame(&lit_frame(0));
        assert_eq!(report.faults, 1);
        assert_eq!(report.squares, 2);
        assert_eq!(report.recorded, 1);
        assert_eq!(renderer.snapshot().outlines.len(), 2);
    }

    #[test]
    fn only_one_accept_per_frame() {
        let vision = StubVision::new(GlyphReading::new(glyph(), 0.9))
            .with_square(0, 0, 400)
            .with_square(500, 0, 300)
            .with_square(900, 0, 250);
        let (mut pipeline, renderer, _) = pipeline(vision, true);

        // Two squares decode on the first frame; the second entry is already
        // stable and locks the third candidate out.
        let report = pipeline.process_frame(&lit_frame(0));
        assert_eq!(report.squares, 3);
        assert_eq!(report.decodes, 2);
        assert_eq!(report.accepted, Some(glyph()));
        let log = renderer.snapshot();
        assert_eq!(log.patterns, vec![glyph()]);
        assert_eq!(log.outlines.len(), 3);
        assert_eq!(pipeline.stats().accepts, 1);
    }

    #[test]
    fn blank_frame_produces_nothing() {
        let vision = StubVision::new(GlyphReading::new(glyph(), 0.9)).with_square(0, 0, 300);
        let (mut pipeline, _, _) = pipeline(vision, true);
        let report = pipeline.process_frame(&Frame::filled(16, 16, 0, 0));
        assert_eq!(report, FrameReport::default());
    }

    #[test]
    fn reset_clears_display() {
        let (mut pipeline, renderer, _) = pipeline(StubVision::default(), true);
        pipeline.reset();
        assert_eq!(renderer.snapshot().clears, 1);
    }
}

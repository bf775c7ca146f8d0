use anyhow::{anyhow, Result};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::detect::backend::{Blob, PolygonClass, VisionPrimitives};
use crate::frame::Frame;
use crate::geometry::{CanonicalCorners, CornerSet, Point};
use crate::glyph::{Glyph, GlyphReading, GRID_SIZE};

/// Relative tolerance for side and diagonal lengths of a square.
const SQUARE_TOLERANCE: f64 = 0.1;

/// Stub backend for tests and the synthetic daemon.
///
/// Pixel operations are simple point-wise transforms. Blob extraction does
/// not look at the image: every non-blank frame yields the configured
/// blobs, and a frame whose pixels are all zero yields none. Decoding pops
/// scripted readings first and falls back to a fixed reading.
pub struct StubVision {
    blobs: Vec<Blob>,
    fallback: GlyphReading,
    scripted: Mutex<VecDeque<Result<GlyphReading, String>>>,
    flip_probability: f64,
    decodes: Arc<AtomicUsize>,
}

impl StubVision {
    pub fn new(fallback: GlyphReading) -> Self {
        Self {
            blobs: Vec::new(),
            fallback,
            scripted: Mutex::new(VecDeque::new()),
            flip_probability: 0.0,
            decodes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a blob whose edge points are the given outline. An empty outline
    /// adds nothing.
    pub fn with_blob(mut self, outline: &[Point]) -> Self {
        if outline.is_empty() {
            return self;
        }
        let (min_x, max_x, min_y, max_y) = outline.iter().fold(
            (i32::MAX, i32::MIN, i32::MAX, i32::MIN),
            |(a, b, c, d), p| (a.min(p.x), b.max(p.x), c.min(p.y), d.max(p.y)),
        );
        let width = max_x.saturating_sub(min_x).max(0) as u32;
        let height = max_y.saturating_sub(min_y).max(0) as u32;
        self.blobs.push(Blob::new(width, height, outline.to_vec()));
        self
    }

    /// Axis-aligned square marker at `(x, y)` with side `side`.
    pub fn with_square(self, x: i32, y: i32, side: i32) -> Self {
        self.with_blob(&[
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ])
    }

    /// Randomly flip one cell of each decoded glyph with this probability.
    pub fn with_noise(mut self, flip_probability: f64) -> Self {
        self.flip_probability = flip_probability.clamp(0.0, 1.0);
        self
    }

    /// Queue a reading for the next decode.
    pub fn push_reading(&self, reading: GlyphReading) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(Ok(reading));
        }
    }

    /// Queue a decode failure for the next decode.
    pub fn push_failure(&self, message: &str) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(Err(message.to_string()));
        }
    }

    /// Shared decode counter; stays valid after the backend is moved.
    pub fn decode_counter(&self) -> Arc<AtomicUsize> {
        self.decodes.clone()
    }

    fn next_reading(&self) -> Result<GlyphReading> {
        let scripted = self
            .scripted
            .lock()
            .map_err(|_| anyhow!("stub script lock poisoned"))?
            .pop_front();
        let reading = match scripted {
            Some(Ok(reading)) => reading,
            Some(Err(message)) => return Err(anyhow!(message)),
            None => self.fallback,
        };
        if self.flip_probability > 0.0 {
            let mut rng = rand::thread_rng();
            if rng.gen_bool(self.flip_probability) {
                let row = rng.gen_range(0..GRID_SIZE);
                let col = rng.gen_range(0..GRID_SIZE);
                return Ok(GlyphReading::new(
                    reading.glyph.with_flipped(row, col),
                    reading.confidence,
                ));
            }
        }
        Ok(reading)
    }
}

impl Default for StubVision {
    fn default() -> Self {
        Self::new(GlyphReading::new(Glyph::empty(), 1.0))
    }
}

impl VisionPrimitives for StubVision {
    type Frame = Frame;

    fn name(&self) -> &'static str {
        "stub"
    }

    fn to_grayscale(&self, frame: &Frame) -> Result<Frame> {
        Ok(frame.clone())
    }

    fn detect_edges(&self, _frame: &mut Frame) -> Result<()> {
        Ok(())
    }

    fn binarize(&self, frame: &mut Frame, threshold: u8) -> Result<()> {
        for p in frame.pixels_mut() {
            *p = if *p > threshold { 255 } else { 0 };
        }
        Ok(())
    }

    fn dilate(&self, _frame: &mut Frame) -> Result<()> {
        Ok(())
    }

    fn extract_blobs(&self, frame: &Frame, min_width: u32, min_height: u32) -> Result<Vec<Blob>> {
        if frame.pixels().iter().all(|p| *p == 0) {
            return Ok(Vec::new());
        }
        let mut blobs: Vec<Blob> = self
            .blobs
            .iter()
            .filter(|b| b.width >= min_width && b.height >= min_height)
            .cloned()
            .collect();
        blobs.sort_by(|a, b| b.area().cmp(&a.area()));
        Ok(blobs)
    }

    fn convex_hull(&self, points: &[Point]) -> Vec<Point> {
        convex_hull(points)
    }

    fn quadrilateral_corners(&self, hull: &[Point]) -> Option<CornerSet> {
        match hull {
            [a, b, c, d] => Some([*a, *b, *c, *d]),
            _ => None,
        }
    }

    fn classify_polygon(&self, corners: &CornerSet) -> PolygonClass {
        classify_quadrilateral(corners)
    }

    fn unwarp_quadrilateral(
        &self,
        frame: &Frame,
        _corners: &CanonicalCorners,
        width: u32,
        height: u32,
    ) -> Result<Frame> {
        Ok(Frame::filled(width, height, frame.sequence(), 255))
    }

    fn auto_threshold(&self, frame: &mut Frame) -> Result<()> {
        self.binarize(frame, 127)
    }

    fn invert(&self, frame: &mut Frame) -> Result<()> {
        for p in frame.pixels_mut() {
            *p = 255 - *p;
        }
        Ok(())
    }

    fn decode_glyph(&self, _frame: &Frame, grid_size: usize) -> Result<GlyphReading> {
        if grid_size != GRID_SIZE {
            return Err(anyhow!("stub decoder only reads {}x{} glyphs", GRID_SIZE, GRID_SIZE));
        }
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.next_reading()
    }
}

/// Andrew's monotone chain, counter-clockwise in a y-up frame, no collinear
/// points.
fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: Point, a: Point, b: Point) -> i64 {
        (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
    }

    let mut hull: Vec<Point> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

fn classify_quadrilateral(corners: &CornerSet) -> PolygonClass {
    let dist = |a: Point, b: Point| {
        let dx = (a.x - b.x) as f64;
        let dy = (a.y - b.y) as f64;
        dx.hypot(dy)
    };
    let sides = [
        dist(corners[0], corners[1]),
        dist(corners[1], corners[2]),
        dist(corners[2], corners[3]),
        dist(corners[3], corners[0]),
    ];
    let diagonals = [dist(corners[0], corners[2]), dist(corners[1], corners[3])];

    let close = |a: f64, b: f64| {
        let scale = a.max(b);
        scale > 0.0 && (a - b).abs() <= scale * SQUARE_TOLERANCE
    };

    let equal_sides = sides.iter().all(|s| close(*s, sides[0]));
    let equal_diagonals = close(diagonals[0], diagonals[1]);
    let opposite_equal = close(sides[0], sides[2]) && close(sides[1], sides[3]);

    match (equal_sides, equal_diagonals, opposite_equal) {
        (true, true, _) => PolygonClass::Square,
        (true, false, _) => PolygonClass::Rhombus,
        (false, true, true) => PolygonClass::Rectangle,
        (false, false, true) => PolygonClass::Parallelogram,
        _ => PolygonClass::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hull_drops_interior_points() {
        let hull = convex_hull(&[
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(5, 5),
            Point::new(10, 10),
            Point::new(0, 10),
            Point::new(5, 0),
        ]);
        assert_eq!(hull.len(), 4);
        for corner in [(0, 0), (10, 0), (10, 10), (0, 10)] {
            assert!(hull.contains(&Point::from(corner)));
        }
    }

    #[test]
    fn empty_outline_adds_no_blob() {
        let vision = StubVision::default().with_blob(&[]).with_square(0, 0, 300);
        let lit = Frame::filled(8, 8, 0, 200);
        let blobs = vision.extract_blobs(&lit, 0, 0).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].width, 300);
    }

    #[test]
    fn classifies_square_and_rectangle() {
        let square = [
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 100),
            Point::new(0, 100),
        ];
        assert_eq!(classify_quadrilateral(&square), PolygonClass::Square);

        let rect = [
            Point::new(0, 0),
            Point::new(200, 0),
            Point::new(200, 100),
            Point::new(0, 100),
        ];
        assert_eq!(classify_quadrilateral(&rect), PolygonClass::Rectangle);
    }

    #[test]
    fn blank_frame_has_no_blobs() {
        let vision = StubVision::default().with_square(0, 0, 300);
        let blank = Frame::filled(8, 8, 0, 0);
        assert!(vision.extract_blobs(&blank, 200, 200).unwrap().is_empty());
        let lit = Frame::filled(8, 8, 1, 200);
        assert_eq!(vision.extract_blobs(&lit, 200, 200).unwrap().len(), 1);
        assert!(vision.extract_blobs(&lit, 400, 400).unwrap().is_empty());
    }

    #[test]
    fn scripted_readings_come_first() {
        let fallback = GlyphReading::new(Glyph::empty(), 0.9);
        let vision = StubVision::new(fallback);
        let scripted = GlyphReading::new(Glyph::empty().with_flipped(0, 0), 0.7);
        vision.push_reading(scripted);
        vision.push_failure("smudged");
        let crop = Frame::filled(4, 4, 0, 255);

        assert_eq!(vision.decode_glyph(&crop, GRID_SIZE).unwrap(), scripted);
        assert!(vision.decode_glyph(&crop, GRID_SIZE).is_err());
        assert_eq!(vision.decode_glyph(&crop, GRID_SIZE).unwrap(), fallback);
        assert_eq!(vision.decode_counter().load(Ordering::SeqCst), 3);
    }

    #[test]
    fn binarize_and_invert() {
        let vision = StubVision::default();
        let mut frame = Frame::new(2, 2, 0, vec![50, 100, 101, 250]).unwrap();
        vision.binarize(&mut frame, 100).unwrap();
        assert_eq!(frame.pixels(), &[0, 0, 255, 255]);
        vision.invert(&mut frame).unwrap();
        assert_eq!(frame.pixels(), &[255, 255, 0, 0]);
    }
}

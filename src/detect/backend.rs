use anyhow::Result;

use crate::geometry::{CanonicalCorners, CornerSet, Point};
use crate::glyph::GlyphReading;

/// Connected region found in the binarized edge image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blob {
    pub width: u32,
    pub height: u32,
    edge_points: Vec<Point>,
}

impl Blob {
    pub fn new(width: u32, height: u32, edge_points: Vec<Point>) -> Self {
        Self {
            width,
            height,
            edge_points,
        }
    }

    pub fn edge_points(&self) -> &[Point] {
        &self.edge_points
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Polygon sub-type reported by the shape checker.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolygonClass {
    Square,
    Rectangle,
    Rhombus,
    Parallelogram,
    Trapezoid,
    Unknown,
}

/// Image-processing capabilities consumed by the detection pipeline.
///
/// # Contract
///
/// The pipeline treats every primitive as correct. Implementations must not
/// keep references to the frames they are given; the pipeline drops every
/// derived frame at the end of the cycle. Any `Err` only skips the current
/// candidate (or the current frame for the preprocessing steps).
pub trait VisionPrimitives: Send {
    /// Backend frame type.
    type Frame;

    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn to_grayscale(&self, frame: &Self::Frame) -> Result<Self::Frame>;

    fn detect_edges(&self, frame: &mut Self::Frame) -> Result<()>;

    /// Fixed threshold binarization. Pixels above `threshold` become white.
    fn binarize(&self, frame: &mut Self::Frame, threshold: u8) -> Result<()>;

    /// 3x3 dilation.
    fn dilate(&self, frame: &mut Self::Frame) -> Result<()>;

    /// Blobs at least `min_width` x `min_height`, largest first.
    fn extract_blobs(
        &self,
        frame: &Self::Frame,
        min_width: u32,
        min_height: u32,
    ) -> Result<Vec<Blob>>;

    fn convex_hull(&self, points: &[Point]) -> Vec<Point>;

    /// Returns the 4 corners when the hull is a quadrilateral.
    fn quadrilateral_corners(&self, hull: &[Point]) -> Option<CornerSet>;

    fn classify_polygon(&self, corners: &CornerSet) -> PolygonClass;

    /// Perspective-correct the quadrilateral into a `width` x `height` crop.
    fn unwarp_quadrilateral(
        &self,
        frame: &Self::Frame,
        corners: &CanonicalCorners,
        width: u32,
        height: u32,
    ) -> Result<Self::Frame>;

    /// Automatic (Otsu) threshold, in place.
    fn auto_threshold(&self, frame: &mut Self::Frame) -> Result<()>;

    fn invert(&self, frame: &mut Self::Frame) -> Result<()>;

    /// Read a `grid_size` x `grid_size` glyph from a rectified binary crop.
    fn decode_glyph(&self, frame: &Self::Frame, grid_size: usize) -> Result<GlyphReading>;
}

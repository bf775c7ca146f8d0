//! Marker corner geometry.
//!
//! Points are in image space: X grows to the right, Y grows downward.

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Quadrilateral corners in the order the vision library reported them.
pub type CornerSet = [Point; 4];

/// Corners after `canonicalize_corners`.
///
/// Slot order is the fixed output order of the quadrant classification:
/// `[x<=cx && y<=cy, x>=cx && y<=cy, x>=cx && y>=cy, x<=cx && y>=cy]`,
/// which is top-left, top-right, bottom-right, bottom-left on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanonicalCorners(pub [Point; 4]);

impl CanonicalCorners {
    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }
}

/// Center of gravity of a point cloud.
pub fn centroid(points: &[Point]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let (sx, sy) = points.iter().fold((0i64, 0i64), |acc, p| {
        (acc.0 + p.x as i64, acc.1 + p.y as i64)
    });
    let n = points.len() as f64;
    (sx as f64 / n, sy as f64 / n)
}

/// Reorder quadrilateral corners around their centroid.
///
/// Each point goes to the first quadrant branch it satisfies. There is no
/// fallback branch: a slot nobody claims keeps the point that was at that
/// index on input, and a slot claimed twice keeps the later point. Rotated
/// markers (around 45 degrees) are not handled.
pub fn canonicalize_corners(corners: &CornerSet) -> CanonicalCorners {
    let (cx, cy) = centroid(corners);

    let [mut p1, mut p2, mut p3, mut p4] = *corners;

    for p in corners {
        let x = p.x as f64;
        let y = p.y as f64;
        if x <= cx && y >= cy {
            p1 = *p;
        } else if x >= cx && y >= cy {
            p2 = *p;
        } else if x >= cx && y <= cy {
            p3 = *p;
        } else if x <= cx && y <= cy {
            p4 = *p;
        }
    }

    CanonicalCorners([p4, p3, p2, p1])
}

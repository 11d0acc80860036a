/*!
Pixel-space geometry shared by the planner, the controller and the session.

Coordinates are integer pixels as reported by the vision subsystem. Image
axes apply: `x` grows to the right, `y` grows downward.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

/// A pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = f64::from(other.x) - f64::from(self.x);
        let dy = f64::from(other.y) - f64::from(self.y);
        dx.hypot(dy)
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Component-wise difference, widened so any two pixels can be subtracted
impl Sub for Point {
    type Output = (i64, i64);

    fn sub(self, rhs: Point) -> Self::Output {
        (
            i64::from(self.x) - i64::from(rhs.x),
            i64::from(self.y) - i64::from(rhs.y),
        )
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Four corners ordered clockwise from the top-left.
///
/// Callers are expected to supply a non-degenerate shape; nothing here
/// checks the area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quadrilateral {
    corners: [Point; 4],
}

impl Quadrilateral {
    /// Build from corners already in clockwise order starting top-left
    pub const fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    /// Build from corners in any order.
    ///
    /// Top-left has the smallest `x + y`, bottom-right the largest.
    /// Top-right has the smallest `y - x`, bottom-left the largest.
    pub fn from_unordered(points: [Point; 4]) -> Self {
        let sum = |p: &&Point| i64::from(p.x) + i64::from(p.y);
        let diff = |p: &&Point| i64::from(p.y) - i64::from(p.x);

        // min_by_key/max_by_key on a non-empty array cannot fail
        let top_left = *points.iter().min_by_key(sum).unwrap_or(&points[0]);
        let bottom_right = *points.iter().max_by_key(sum).unwrap_or(&points[2]);
        let top_right = *points.iter().min_by_key(diff).unwrap_or(&points[1]);
        let bottom_left = *points.iter().max_by_key(diff).unwrap_or(&points[3]);

        Self::new([top_left, top_right, bottom_right, bottom_left])
    }

    /// Shrink the shape by moving every corner `inset` pixels inward on both axes.
    ///
    /// Coordinates saturate at the `i32` range.
    pub fn inset(&self, inset: i32) -> Self {
        let [tl, tr, br, bl] = self.corners;
        Self::new([
            Point::new(tl.x.saturating_add(inset), tl.y.saturating_add(inset)),
            Point::new(tr.x.saturating_sub(inset), tr.y.saturating_add(inset)),
            Point::new(br.x.saturating_sub(inset), br.y.saturating_sub(inset)),
            Point::new(bl.x.saturating_add(inset), bl.y.saturating_sub(inset)),
        ])
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    pub fn corner(&self, index: usize) -> Point {
        self.corners[index % 4]
    }

    /// The four edges as (start, end) pairs, closing back to corner 0
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        (0..4).map(move |i| (self.corner(i), self.corner(i + 1)))
    }
}

impl Default for Quadrilateral {
    /// Calibration rectangle used until one is marked or detected
    fn default() -> Self {
        Self::new([
            Point::new(97, 90),
            Point::new(392, 96),
            Point::new(398, 395),
            Point::new(92, 404),
        ])
    }
}

impl From<[Point; 4]> for Quadrilateral {
    fn from(corners: [Point; 4]) -> Self {
        Self::new(corners)
    }
}

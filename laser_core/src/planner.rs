/*!
Waypoint planning around a quadrilateral.

The planner turns four corners into an ordered list of integer waypoints
that the tracking controller walks one at a time. Planning is pure: the
same quadrilateral and step always give the same path.
*/

use crate::error::{Result, TrackerError};
use crate::geometry::{Point, Quadrilateral};
use num_traits::ToPrimitive;
use std::ops::Index;
use tracing::debug;

/// Ordered waypoints around a quadrilateral.
///
/// The first waypoint is corner 0. The loop is closed implicitly: the last
/// waypoint is never a copy of the first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WaypointPath {
    points: Vec<Point>,
}

impl WaypointPath {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }
}

impl Index<usize> for WaypointPath {
    type Output = Point;

    /// # Panics
    ///
    /// Panics if `index >= self.len()`; use [`WaypointPath::get`] for a checked lookup.
    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

/// Upper bound on segments per edge; finer steps are rejected rather than allocated
pub const MAX_EDGE_SEGMENTS: usize = 1 << 16;

fn check_step(step: f64) -> Result<()> {
    // Also rejects NaN
    if step > 0.0 {
        Ok(())
    } else {
        Err(TrackerError::InvalidStep(step))
    }
}

/// Round half to even, saturating at the i32 range
fn round_coord(value: f64) -> i32 {
    let rounded = value.round_ties_even();
    rounded.to_i32().unwrap_or(if rounded < 0.0 { i32::MIN } else { i32::MAX })
}

/// Evenly spaced points from `start` to `end`, both included.
///
/// Short edges (`distance <= step`) yield just the endpoints. Otherwise the
/// edge is cut into `floor(distance / step)` equal segments, so interior
/// spacing lies in `[step, 2 * step)` before rounding. Consecutive repeats
/// are collapsed. Edges needing more than [`MAX_EDGE_SEGMENTS`] segments
/// fail with [`TrackerError::PathTooDense`].
pub fn generate_points_on_edge(start: Point, end: Point, step: f64) -> Result<Vec<Point>> {
    check_step(step)?;

    let distance = start.distance_to(end);
    if distance <= step {
        return Ok(if start == end { vec![start] } else { vec![start, end] });
    }

    let segments = (distance / step).floor();
    if segments > MAX_EDGE_SEGMENTS as f64 {
        return Err(TrackerError::PathTooDense {
            distance,
            step,
            max: MAX_EDGE_SEGMENTS,
        });
    }
    let num_steps = segments as usize;
    let (x1, y1) = (f64::from(start.x), f64::from(start.y));
    let (dx, dy) = (f64::from(end.x) - x1, f64::from(end.y) - y1);

    let mut points = Vec::with_capacity(num_steps + 2);
    for i in 0..=num_steps {
        let t = i as f64 / num_steps as f64;
        let point = Point::new(round_coord(x1 + t * dx), round_coord(y1 + t * dy));
        if points.last() != Some(&point) {
            points.push(point);
        }
    }

    if points.last() != Some(&end) {
        points.push(end);
    }

    Ok(points)
}

/// Waypoints along all four edges of `quad`, starting at corner 0.
///
/// Every edge after the first drops its starting point, which repeats the
/// previous edge's end. The closing edge stops short of corner 0.
pub fn generate_rectangle_points(quad: &Quadrilateral, step: f64) -> Result<WaypointPath> {
    check_step(step)?;

    let mut points: Vec<Point> = Vec::new();
    for (i, (start, end)) in quad.edges().enumerate() {
        let edge = generate_points_on_edge(start, end, step)?;
        let skip = if i == 0 { 0 } else { 1 };
        points.extend(edge.into_iter().skip(skip));
    }

    if points.len() > 1 && points.last() == points.first() {
        points.pop();
    }

    debug!("Planned {} waypoints (step {})", points.len(), step);
    Ok(WaypointPath::new(points))
}

/// Midpoint of the corner 0 to corner 2 diagonal, floor-divided
pub fn rectangle_center(quad: &Quadrilateral) -> Point {
    let a = quad.corner(0);
    let c = quad.corner(2);
    // The floor of the mean of two i32 values always fits back into an i32
    let mid = |p: i32, q: i32| (i64::from(p) + i64::from(q)).div_euclid(2) as i32;
    Point::new(mid(a.x, c.x), mid(a.y, c.y))
}

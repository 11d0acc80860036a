/*!
Path tracking controller.

Consumes one laser detection per control tick, measures it against the
current waypoint and decides whether to move on to the next one. Two
advancement policies exist:

- [`AdvanceMode::Mixed`] - corners must be hit within `corner_threshold`;
  edge waypoints advance purely on time (`edge_time_ms`).
- [`AdvanceMode::Precision`] - every waypoint must be hit within its
  threshold. There is no time fallback unless `precision_timeout_ms` is
  configured.

The controller is single-writer: reconfiguration happens between ticks.
*/

use crate::error::Result;
use crate::geometry::{Point, Quadrilateral};
use crate::planner::{generate_rectangle_points, WaypointPath};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default distance within which a waypoint counts as a corner
pub const DEFAULT_CORNER_TOLERANCE: f64 = 8.0;

/// Waypoint advancement policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvanceMode {
    #[default]
    Mixed,
    Precision,
}

/// Tunable advancement thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Distance (px) under which a corner waypoint is reached
    pub corner_threshold: f64,

    /// Distance (px) under which an edge waypoint is reached in precision mode
    pub edge_threshold: f64,

    /// Dwell time on an edge waypoint in mixed mode
    pub edge_time_ms: u64,

    /// Gain applied to the error while the target is a corner
    pub corner_amplify: f64,

    /// Distance (px) from a quadrilateral corner that classifies a waypoint as a corner.
    /// Independent of `corner_threshold`.
    pub corner_tolerance: f64,

    /// Opt-in time fallback for precision mode. `None` keeps the strict policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision_timeout_ms: Option<u64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            corner_threshold: 10.0,
            edge_threshold: 15.0,
            edge_time_ms: 300,
            corner_amplify: 1.2,
            corner_tolerance: DEFAULT_CORNER_TOLERANCE,
            precision_timeout_ms: None,
        }
    }
}

/// Corrective error sent to the motor controller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorVector {
    pub x: f64,
    pub y: f64,
}

impl ErrorVector {
    pub const ZERO: ErrorVector = ErrorVector { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// `target - detected`
    pub fn between(target: Point, detected: Point) -> Self {
        let (dx, dy) = target - detected;
        Self::new(dx as f64, dy as f64)
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn scaled(&self, gain: f64) -> Self {
        Self::new(self.x * gain, self.y * gain)
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Where the controller is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// No path loaded yet
    AwaitingPath,
    /// Walking the path
    Tracking,
    /// Every waypoint reached; terminal until the next path is loaded
    Complete,
}

/// Mutable tracking state, reset whenever a new path is loaded
#[derive(Debug, Clone, PartialEq)]
pub struct TrackState {
    pub target_index: usize,
    pub mode: AdvanceMode,
    pub last_switch_ms: u64,
    pub thresholds: Thresholds,
}

impl TrackState {
    pub fn new(mode: AdvanceMode, thresholds: Thresholds) -> Self {
        Self {
            target_index: 0,
            mode,
            last_switch_ms: 0,
            thresholds,
        }
    }
}

/// Result of one control tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Error to send downstream, already amplified for corners
    pub error: ErrorVector,
    /// Whether this tick moved to the next waypoint
    pub advanced: bool,
    /// Waypoint the error was measured against, if any
    pub target: Option<Point>,
    pub is_corner: bool,
}

impl TickOutcome {
    /// Neutral output: zero error, hold position
    pub fn hold() -> Self {
        Self {
            error: ErrorVector::ZERO,
            advanced: false,
            target: None,
            is_corner: false,
        }
    }
}

/// True if `point` lies within `tolerance` of any corner
pub fn is_corner(point: Point, corners: &[Point; 4], tolerance: f64) -> bool {
    corners.iter().any(|c| point.distance_to(*c) <= tolerance)
}

/// Walks a [`WaypointPath`] one detection at a time
#[derive(Debug, Clone)]
pub struct TrackingController {
    quad: Option<Quadrilateral>,
    path: WaypointPath,
    state: TrackState,
}

impl TrackingController {
    pub fn new(mode: AdvanceMode, thresholds: Thresholds) -> Self {
        Self {
            quad: None,
            path: WaypointPath::default(),
            state: TrackState::new(mode, thresholds),
        }
    }

    /// Load a new path and restart from its first waypoint
    pub fn reset_path(&mut self, quad: Quadrilateral, path: WaypointPath, now_ms: u64) {
        info!("🎯 New path: {} waypoints, mode {:?}", path.len(), self.state.mode);
        self.quad = Some(quad);
        self.path = path;
        self.state.target_index = 0;
        self.state.last_switch_ms = now_ms;
    }

    /// Plan a path around `quad` with spacing `step` and load it
    pub fn load_quadrilateral(&mut self, quad: Quadrilateral, step: f64, now_ms: u64) -> Result<usize> {
        let path = generate_rectangle_points(&quad, step)?;
        let len = path.len();
        self.reset_path(quad, path, now_ms);
        Ok(len)
    }

    /// Drop the current path and go back to awaiting one
    pub fn clear(&mut self) {
        self.quad = None;
        self.path = WaypointPath::default();
        self.state.target_index = 0;
    }

    pub fn set_mode(&mut self, mode: AdvanceMode) {
        self.state.mode = mode;
    }

    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.state.thresholds = thresholds;
    }

    pub fn phase(&self) -> TrackPhase {
        match self.quad {
            None => TrackPhase::AwaitingPath,
            Some(_) if self.state.target_index >= self.path.len() => TrackPhase::Complete,
            Some(_) => TrackPhase::Tracking,
        }
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    pub fn path(&self) -> &WaypointPath {
        &self.path
    }

    pub fn quadrilateral(&self) -> Option<&Quadrilateral> {
        self.quad.as_ref()
    }

    /// Waypoint currently being chased, if tracking
    pub fn current_target(&self) -> Option<Point> {
        self.quad.as_ref()?;
        self.path.get(self.state.target_index)
    }

    /// Process one detection.
    ///
    /// A missing detection, or a controller that is not tracking, yields a
    /// zero error and never advances.
    pub fn tick(&mut self, detected: Option<Point>, now_ms: u64) -> TickOutcome {
        let (Some(quad), Some(target)) = (self.quad.as_ref(), self.current_target()) else {
            return TickOutcome::hold();
        };
        let Some(detected) = detected else {
            return TickOutcome::hold();
        };

        let thresholds = &self.state.thresholds;
        let corner = is_corner(target, quad.corners(), thresholds.corner_tolerance);
        let error = ErrorVector::between(target, detected);
        let distance = error.magnitude();
        let elapsed = now_ms.saturating_sub(self.state.last_switch_ms);

        let advanced = match self.state.mode {
            AdvanceMode::Mixed if corner => distance < thresholds.corner_threshold,
            AdvanceMode::Mixed => elapsed >= thresholds.edge_time_ms,
            AdvanceMode::Precision => {
                let threshold = if corner {
                    thresholds.corner_threshold
                } else {
                    thresholds.edge_threshold
                };
                distance < threshold
                    || thresholds.precision_timeout_ms.is_some_and(|limit| elapsed >= limit)
            }
        };

        let error = if corner {
            error.scaled(thresholds.corner_amplify)
        } else {
            error
        };

        if advanced {
            self.state.target_index += 1;
            self.state.last_switch_ms = now_ms;
            debug!(
                "Advanced to waypoint {}/{} ({} {} reached at {:.1}px)",
                self.state.target_index,
                self.path.len(),
                if corner { "corner" } else { "edge" },
                target,
                distance
            );
            if self.phase() == TrackPhase::Complete {
                info!("✅ Path complete ({} waypoints)", self.path.len());
            }
        }

        TickOutcome {
            error,
            advanced,
            target: Some(target),
            is_corner: corner,
        }
    }
}

impl Default for TrackingController {
    fn default() -> Self {
        Self::new(AdvanceMode::default(), Thresholds::default())
    }
}

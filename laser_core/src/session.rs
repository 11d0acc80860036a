/*!
Tracking session: the mode machine around the controller.

A session starts idle with a calibration quadrilateral. Serial commands
switch it between manual corner marking, center tracking and path
tracking; every camera frame then produces at most one output for the
motor controller.
*/

use crate::command::Command;
use crate::error::Result;
use crate::geometry::{Point, Quadrilateral};
use crate::planner::rectangle_center;
use crate::tracking::{AdvanceMode, ErrorVector, Thresholds, TrackPhase, TrackingController};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Advancement settings applied when a path starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackProfile {
    pub mode: AdvanceMode,
    /// Waypoint spacing in pixels
    pub step: f64,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl TrackProfile {
    /// Tracing a hand-marked quadrilateral: accurate corners, timed edges
    pub fn manual_path() -> Self {
        Self {
            mode: AdvanceMode::Mixed,
            step: 20.0,
            thresholds: Thresholds {
                corner_threshold: 12.0,
                edge_threshold: 15.0,
                edge_time_ms: 300,
                corner_amplify: 1.2,
                ..Thresholds::default()
            },
        }
    }

    /// Tracing a detected quadrilateral pixel by pixel, every point gated
    pub fn auto_detect() -> Self {
        Self {
            mode: AdvanceMode::Precision,
            step: 1.0,
            thresholds: Thresholds {
                corner_threshold: 12.0,
                edge_threshold: 10.0,
                edge_time_ms: 500,
                corner_amplify: 1.1,
                ..Thresholds::default()
            },
        }
    }
}

/// Profiles selected by the path commands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profiles {
    /// Used by `TRACK_PATH_POINT`
    pub path: TrackProfile,
    /// Used by `DETECT_RECTANGLE`
    pub auto: TrackProfile,
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            path: TrackProfile::manual_path(),
            auto: TrackProfile::auto_detect(),
        }
    }
}

/// What the session is doing with each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    ManualMark,
    TrackCenter,
    TrackPath,
}

/// Result of one session step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionOutput {
    /// Nothing to send this frame
    Silent,
    /// A corner was marked from the laser position
    Marked { index: usize, point: Point },
    /// Error to send to the motor controller
    Error { error: ErrorVector, advanced: bool },
}

/// Owns the controller and all per-run tracking state
#[derive(Debug, Clone)]
pub struct TrackerSession {
    mode: SessionMode,
    controller: TrackingController,
    profiles: Profiles,
    default_quad: Quadrilateral,
    active_quad: Quadrilateral,
    marks: [Point; 4],
    mark_count: usize,
    marking: bool,
}

impl TrackerSession {
    pub fn new(default_quad: Quadrilateral, profiles: Profiles) -> Self {
        Self {
            mode: SessionMode::Idle,
            controller: TrackingController::default(),
            profiles,
            default_quad,
            active_quad: default_quad,
            marks: *default_quad.corners(),
            mark_count: 0,
            marking: false,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn controller(&self) -> &TrackingController {
        &self.controller
    }

    pub fn active_quad(&self) -> &Quadrilateral {
        &self.active_quad
    }

    pub fn marked_quad(&self) -> Quadrilateral {
        Quadrilateral::new(self.marks)
    }

    pub fn mark_count(&self) -> usize {
        self.mark_count
    }

    pub fn is_marking(&self) -> bool {
        self.marking
    }

    /// Apply a serial command.
    ///
    /// `detected_quad` is the vision subsystem's latest quadrilateral and is
    /// only consulted for [`Command::DetectRectangle`].
    pub fn apply(&mut self, command: Command, detected_quad: Option<Quadrilateral>, now_ms: u64) -> Result<()> {
        info!("📨 Command: {}", command);
        match command {
            Command::StartMarking => {
                self.mode = SessionMode::ManualMark;
                self.mark_count = 0;
                self.marking = true;
                self.controller.clear();
            }
            Command::ResetMarks => {
                self.mark_count = 0;
                self.marking = true;
                self.active_quad = self.default_quad;
            }
            Command::TrackCenter => {
                self.mode = SessionMode::TrackCenter;
                self.controller.clear();
            }
            Command::TrackPath => {
                self.active_quad = self.marked_quad();
                self.start_path(self.profiles.path, now_ms)?;
            }
            Command::DetectRectangle => match detected_quad {
                Some(quad) => {
                    self.active_quad = quad;
                    self.start_path(self.profiles.auto, now_ms)?;
                }
                None => warn!("⚠️ No quadrilateral detected, staying in {:?}", self.mode),
            },
        }
        Ok(())
    }

    fn start_path(&mut self, profile: TrackProfile, now_ms: u64) -> Result<()> {
        self.controller.set_mode(profile.mode);
        self.controller.set_thresholds(profile.thresholds);
        self.controller
            .load_quadrilateral(self.active_quad, profile.step, now_ms)?;
        self.mode = SessionMode::TrackPath;
        Ok(())
    }

    /// Process one camera frame's laser detection
    pub fn step(&mut self, detected: Option<Point>, now_ms: u64) -> SessionOutput {
        match self.mode {
            SessionMode::Idle => SessionOutput::Silent,
            SessionMode::ManualMark => self.mark(detected),
            SessionMode::TrackCenter => {
                let error = detected
                    .map(|laser| ErrorVector::between(rectangle_center(&self.active_quad), laser))
                    .unwrap_or(ErrorVector::ZERO);
                SessionOutput::Error { error, advanced: false }
            }
            SessionMode::TrackPath => {
                let outcome = self.controller.tick(detected, now_ms);
                SessionOutput::Error {
                    error: outcome.error,
                    advanced: outcome.advanced,
                }
            }
        }
    }

    fn mark(&mut self, detected: Option<Point>) -> SessionOutput {
        let (true, Some(point)) = (self.marking, detected) else {
            return SessionOutput::Silent;
        };

        let index = self.mark_count;
        self.marks[index] = point;
        self.mark_count += 1;
        info!("📍 Marked corner {}: {}", index + 1, point);

        if self.mark_count >= self.marks.len() {
            self.marking = false;
            self.active_quad = self.marked_quad();
            info!("✅ All 4 corners marked");
        }
        SessionOutput::Marked { index, point }
    }

    /// True once a path run has reached its last waypoint
    pub fn path_complete(&self) -> bool {
        self.mode == SessionMode::TrackPath && self.controller.phase() == TrackPhase::Complete
    }
}

impl Default for TrackerSession {
    fn default() -> Self {
        Self::new(Quadrilateral::default(), Profiles::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Laser that moves a fraction of the commanded error each frame
    struct SimLaser {
        x: f64,
        y: f64,
        gain: f64,
    }

    impl SimLaser {
        fn position(&self) -> Point {
            Point::new(self.x.round() as i32, self.y.round() as i32)
        }

        fn apply(&mut self, error: ErrorVector) {
            self.x += error.x * self.gain;
            self.y += error.y * self.gain;
        }
    }

    fn run_until_complete(session: &mut TrackerSession, laser: &mut SimLaser, max_ticks: u64) -> Option<u64> {
        for tick in 0..max_ticks {
            let now = 1_000 + tick * 20;
            if let SessionOutput::Error { error, .. } = session.step(Some(laser.position()), now) {
                laser.apply(error);
            }
            if session.path_complete() {
                return Some(tick);
            }
        }
        None
    }

    #[test]
    fn test_idle_is_silent() {
        let mut session = TrackerSession::default();
        assert_eq!(session.mode(), SessionMode::Idle);
        assert_eq!(session.step(Some(Point::new(1, 2)), 0), SessionOutput::Silent);
    }

    #[test]
    fn test_manual_marking_then_track_path() {
        let mut session = TrackerSession::default();
        session.apply(Command::StartMarking, None, 0).unwrap();
        assert_eq!(session.mode(), SessionMode::ManualMark);

        let corners = [
            Point::new(50, 50),
            Point::new(250, 55),
            Point::new(255, 250),
            Point::new(45, 245),
        ];

        // Frames without a laser do not consume a mark
        assert_eq!(session.step(None, 0), SessionOutput::Silent);

        for (i, corner) in corners.iter().enumerate() {
            assert_eq!(
                session.step(Some(*corner), i as u64),
                SessionOutput::Marked { index: i, point: *corner }
            );
        }
        assert!(!session.is_marking());
        assert_eq!(session.active_quad().corners(), &corners);

        // Marking is finished, further detections are ignored
        assert_eq!(session.step(Some(Point::new(1, 1)), 10), SessionOutput::Silent);

        session.apply(Command::TrackPath, None, 100).unwrap();
        assert_eq!(session.mode(), SessionMode::TrackPath);
        assert_eq!(session.controller().path()[0], corners[0]);
        assert_eq!(session.controller().state().mode, AdvanceMode::Mixed);
        assert_eq!(session.controller().state().thresholds.corner_threshold, 12.0);
    }

    #[test]
    fn test_reset_marks_restores_default_quad() {
        let mut session = TrackerSession::default();
        session.apply(Command::StartMarking, None, 0).unwrap();
        for i in 0..4 {
            session.step(Some(Point::new(10 * i, 10 * i)), 0);
        }
        assert_ne!(session.active_quad(), &Quadrilateral::default());

        session.apply(Command::ResetMarks, None, 0).unwrap();
        assert_eq!(session.active_quad(), &Quadrilateral::default());
        assert_eq!(session.mark_count(), 0);
        assert!(session.is_marking());
    }

    #[test]
    fn test_track_center() {
        let mut session = TrackerSession::default();
        session.apply(Command::TrackCenter, None, 0).unwrap();

        // Default quad center is (247, 242)
        assert_eq!(
            session.step(Some(Point::new(240, 250)), 0),
            SessionOutput::Error {
                error: ErrorVector::new(7.0, -8.0),
                advanced: false
            }
        );
        assert_eq!(
            session.step(None, 0),
            SessionOutput::Error {
                error: ErrorVector::ZERO,
                advanced: false
            }
        );
    }

    #[test]
    fn test_track_center_with_extreme_detection() {
        let mut session = TrackerSession::default();
        session.apply(Command::TrackCenter, None, 0).unwrap();

        let error = match session.step(Some(Point::new(i32::MIN, i32::MAX)), 0) {
            SessionOutput::Error { error, .. } => error,
            other => panic!("unexpected output: {:?}", other),
        };
        assert_eq!(error.x, 247.0 - f64::from(i32::MIN));
        assert_eq!(error.y, 242.0 - f64::from(i32::MAX));
    }

    #[test]
    fn test_detect_rectangle_uses_auto_profile() {
        let mut session = TrackerSession::default();
        let detected = Quadrilateral::new([
            Point::new(100, 100),
            Point::new(140, 100),
            Point::new(140, 140),
            Point::new(100, 140),
        ]);

        session.apply(Command::DetectRectangle, Some(detected), 0).unwrap();
        assert_eq!(session.mode(), SessionMode::TrackPath);
        assert_eq!(session.active_quad(), &detected);
        assert_eq!(session.controller().state().mode, AdvanceMode::Precision);
        // Step 1 around a 40px square
        assert_eq!(session.controller().path().len(), 160);
    }

    #[test]
    fn test_detect_rectangle_not_found_keeps_mode() {
        let mut session = TrackerSession::default();
        session.apply(Command::TrackCenter, None, 0).unwrap();
        session.apply(Command::DetectRectangle, None, 0).unwrap();
        assert_eq!(session.mode(), SessionMode::TrackCenter);
        assert_eq!(session.controller().phase(), TrackPhase::AwaitingPath);
    }

    #[test]
    fn test_invalid_profile_step_is_an_error() {
        let mut profiles = Profiles::default();
        profiles.path.step = 0.0;
        let mut session = TrackerSession::new(Quadrilateral::default(), profiles);
        assert!(session.apply(Command::TrackPath, None, 0).is_err());
        assert_eq!(session.mode(), SessionMode::Idle);
    }

    #[test]
    fn test_mixed_path_completes_with_simulated_laser() {
        let mut session = TrackerSession::default();
        session.apply(Command::TrackPath, None, 1_000).unwrap();

        let mut laser = SimLaser { x: 240.0, y: 240.0, gain: 0.5 };
        assert!(run_until_complete(&mut session, &mut laser, 10_000).is_some());

        // Completed sessions keep sending a neutral error
        assert_eq!(
            session.step(Some(Point::new(0, 0)), 1_000_000),
            SessionOutput::Error {
                error: ErrorVector::ZERO,
                advanced: false
            }
        );
    }

    #[test]
    fn test_precision_path_completes_with_simulated_laser() {
        let mut session = TrackerSession::default();
        let quad = Quadrilateral::new([
            Point::new(100, 100),
            Point::new(160, 102),
            Point::new(158, 160),
            Point::new(98, 158),
        ]);
        session.apply(Command::DetectRectangle, Some(quad), 1_000).unwrap();

        let mut laser = SimLaser { x: 130.0, y: 130.0, gain: 0.5 };
        assert!(run_until_complete(&mut session, &mut laser, 20_000).is_some());
    }
}

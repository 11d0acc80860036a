/*!
Offline simulation.

Drives the real session, codec and control loop against a loopback link.
A synthetic motor controller decodes each error frame and moves a virtual
laser by `gain * error`; the laser position is fed back as the next
camera detection.
*/

use crate::config::AppConfig;
use crate::control::ControlLoop;
use crate::transport::LoopbackTransport;
use anyhow::Context;
use clap::ValueEnum;
use laser_core::{codec, Command, ErrorVector, Point, Quadrilateral, ReceiverState, TrackerSession};
use tracing::{debug, info};

/// Which path command the simulated controller sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SimProfile {
    /// `TRACK_PATH_POINT` around the configured default quadrilateral
    Path,
    /// `DETECT_RECTANGLE` around a quadrilateral published by the fake camera
    Detect,
}

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub profile: SimProfile,
    /// Fraction of the error the laser moves per frame
    pub gain: f64,
    pub frame_ms: u64,
    pub max_ticks: u64,
    /// Every n-th frame reports no detection; 0 disables dropouts
    pub dropout_every: u64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            profile: SimProfile::Path,
            gain: 0.5,
            frame_ms: 20,
            max_ticks: 20_000,
            dropout_every: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimReport {
    pub waypoints: usize,
    pub ticks: u64,
    pub completed: bool,
    pub final_position: Point,
}

struct VirtualLaser {
    x: f64,
    y: f64,
}

impl VirtualLaser {
    fn position(&self) -> Point {
        Point::new(self.x.round() as i32, self.y.round() as i32)
    }

    fn nudge(&mut self, error: ErrorVector, gain: f64) {
        self.x += error.x * gain;
        self.y += error.y * gain;
    }
}

/// Quadrilateral the fake camera reports for [`SimProfile::Detect`]
fn detected_quad(config: &AppConfig) -> Quadrilateral {
    config.tracking.default_quad.inset(40)
}

pub fn run_simulation(config: &AppConfig, options: &SimOptions) -> anyhow::Result<SimReport> {
    let peer = LoopbackTransport::new();
    let session = TrackerSession::new(config.tracking.default_quad, config.session_profiles());
    let mut control = ControlLoop::new(session, peer.clone(), config.tracking.error_format);
    let mut peer_decoder = ReceiverState::new();

    let command = match options.profile {
        SimProfile::Path => Command::TrackPath,
        SimProfile::Detect => {
            control.observe_quad(detected_quad(config));
            Command::DetectRectangle
        }
    };
    peer.inject(&codec::encode(command.as_token().as_bytes())?);
    control.poll_serial(0).context("Failed to deliver start command")?;
    if control.stats().rejected > 0 {
        anyhow::bail!("Session rejected {}; check the profile step", command);
    }

    let waypoints = control.session().controller().path().len();
    info!("🧪 Simulating {} over {} waypoints", command, waypoints);

    let center = laser_core::rectangle_center(&config.tracking.default_quad);
    let mut laser = VirtualLaser {
        x: f64::from(center.x),
        y: f64::from(center.y),
    };

    let mut ticks = 0;
    while ticks < options.max_ticks && !control.session().path_complete() {
        let now_ms = ticks * options.frame_ms;
        let dropout = options.dropout_every > 0 && ticks % options.dropout_every == options.dropout_every - 1;
        let detected = if dropout { None } else { Some(laser.position()) };

        control.tick(detected, now_ms)?;
        for frame in peer_decoder.feed(&peer.take_written()) {
            let error = config.tracking.error_format.parse(&frame)?;
            laser.nudge(error, options.gain);
        }
        ticks += 1;

        if ticks % 500 == 0 {
            let target = control.session().controller().state().target_index;
            debug!("Tick {}: waypoint {}/{}, laser at {}", ticks, target, waypoints, laser.position());
        }
    }

    let report = SimReport {
        waypoints,
        ticks,
        completed: control.session().path_complete(),
        final_position: laser.position(),
    };

    if report.completed {
        info!("✅ Path completed in {} frames ({:.1}s simulated)", ticks, (ticks * options.frame_ms) as f64 / 1000.0);
    } else {
        info!("⏱️ Stopped after {} frames without completing the path", ticks);
    }
    control.log_stats();

    Ok(report)
}

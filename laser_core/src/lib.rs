/*!
# Laser Tracker Core

Planning, tracking and serial framing for a camera-guided laser that
traces the outline of a quadrilateral target.

## Core Types

- [`Quadrilateral`] - Four corners, clockwise from top-left
- [`WaypointPath`] - Ordered integer waypoints around a quadrilateral
- [`TrackingController`] - Per-tick waypoint advancement (MIXED / PRECISION)
- [`FrameEncoder`] / [`ReceiverState`] - Serial frame codec
- [`TrackerSession`] - Command-driven mode machine around the controller

## Modules

- [`planner`] - Waypoint generation
- [`tracking`] - Advancement policies and error computation
- [`codec`] - `0xAA len payload 0x55` framing with resynchronisation
- [`payload`] - Error vector and tagged message payload formats
- [`command`] - Inbound command tokens
- [`session`] - Tracking modes and profiles
- [`error`] - Common error types
*/

pub mod codec;
pub mod command;
pub mod error;
pub mod geometry;
pub mod payload;
pub mod planner;
pub mod session;
pub mod tracking;

// Re-export commonly used types
pub use codec::{DecodePhase, DecoderStats, FrameEncoder, ReceiverState};
pub use command::{Command, InboundMessage};
pub use error::{Result, TrackerError};
pub use geometry::{Point, Quadrilateral};
pub use payload::{ErrorFormat, Payload, TaggedMessage};
pub use planner::{generate_points_on_edge, generate_rectangle_points, rectangle_center, WaypointPath, MAX_EDGE_SEGMENTS};
pub use session::{Profiles, SessionMode, SessionOutput, TrackProfile, TrackerSession};
pub use tracking::{AdvanceMode, ErrorVector, Thresholds, TickOutcome, TrackPhase, TrackingController};

/// Version information for the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Serial protocol constants
pub mod protocol {
    /// Frame start sentinel
    pub const FRAME_HEADER: u8 = 0xAA;

    /// Frame end sentinel
    pub const FRAME_TAIL: u8 = 0x55;

    /// Largest payload a one-byte length field can describe
    pub const MAX_PAYLOAD_LEN: usize = 255;

    /// Header, length and tail bytes around each payload
    pub const FRAME_OVERHEAD: usize = 3;

    /// Largest complete frame on the wire
    pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN + FRAME_OVERHEAD;
}

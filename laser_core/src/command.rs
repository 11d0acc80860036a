/*!
Inbound commands from the serial peer.

Text tokens map to a closed set of session actions. Anything else is
either a tagged message (see [`TaggedMessage`]) or unknown; unknown input
is reported to the caller and never treated as fatal.
*/

use crate::payload::{Payload, TaggedMessage};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Session actions requested over the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Start collecting four corners from laser detections
    StartMarking,
    /// Forget marked corners and start collecting again
    ResetMarks,
    /// Hold the laser on the quadrilateral's center
    TrackCenter,
    /// Trace the marked quadrilateral's perimeter
    TrackPath,
    /// Use the vision subsystem's quadrilateral and trace it precisely
    DetectRectangle,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::StartMarking,
        Command::ResetMarks,
        Command::TrackCenter,
        Command::TrackPath,
        Command::DetectRectangle,
    ];

    /// Token as sent on the wire
    pub fn as_token(&self) -> &'static str {
        match self {
            Command::StartMarking => "MANUAL_MARKING",
            Command::ResetMarks => "RESET_MANUAL_MARK",
            Command::TrackCenter => "TRACK_POINT_CENTER",
            Command::TrackPath => "TRACK_PATH_POINT",
            Command::DetectRectangle => "DETECT_RECTANGLE",
        }
    }
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "MANUAL_MARKING" => Ok(Command::StartMarking),
            "RESET_MANUAL_MARK" => Ok(Command::ResetMarks),
            "TRACK_POINT_CENTER" => Ok(Command::TrackCenter),
            "TRACK_PATH_POINT" => Ok(Command::TrackPath),
            "DETECT_RECTANGLE" => Ok(Command::DetectRectangle),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Classified inbound frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Command(Command),
    Tagged(TaggedMessage),
    Unknown(Payload),
}

impl InboundMessage {
    /// Classify a decoded payload: command token first, then tagged form
    pub fn classify(payload: Payload) -> Self {
        let known = payload.as_text().and_then(|text| match text.parse::<Command>() {
            Ok(command) => Some(InboundMessage::Command(command)),
            Err(()) => TaggedMessage::parse(text.trim().as_bytes())
                .ok()
                .map(InboundMessage::Tagged),
        });

        known.unwrap_or(InboundMessage::Unknown(payload))
    }

    /// Classify raw frame bytes
    pub fn from_frame(frame: Bytes) -> Self {
        Self::classify(Payload::from_bytes(frame))
    }
}

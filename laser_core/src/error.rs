/*!
Common error types for the laser tracker core.
*/

use thiserror::Error;

/// Common result type used throughout the core library
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors raised by planning, framing and message parsing.
///
/// Sensing gaps and corrupt frames are not errors; they are handled where
/// they occur. Only caller misuse and malformed messages end up here.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Waypoint spacing must be strictly positive
    #[error("Invalid waypoint step: {0} (must be > 0)")]
    InvalidStep(f64),

    /// Step is so small relative to the edge that the waypoint count is unbounded
    #[error("Path too dense: edge of {distance:.1} px at step {step} exceeds {max} segments")]
    PathTooDense { distance: f64, step: f64, max: usize },

    /// Frame payloads carry a one-byte length field
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// Tagged message failed the receiving peer's format rules
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O errors (transport reads and writes)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Create a new invalid message error
    pub fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }

    /// Create a payload-too-large error for a payload of `len` bytes
    pub fn payload_too_large(len: usize) -> Self {
        Self::PayloadTooLarge {
            len,
            max: crate::protocol::MAX_PAYLOAD_LEN,
        }
    }
}

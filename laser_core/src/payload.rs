/*!
Payload formats carried inside codec frames.

Outbound, the control loop sends the corrective error in one of the
[`ErrorFormat`] shapes. The short ASCII-tagged form ([`TaggedMessage`]) is
used for command codes, tracking values and plain numbers:

| tag | example  | meaning                  |
|-----|----------|--------------------------|
| `C` | `C:0x01` | command code (hex byte)  |
| `T` | `T:0x33` | tracking value (hex byte)|
| `N` | `N:123`  | signed decimal number    |

Inbound payloads are surfaced as [`Payload`]: text when the bytes are
valid UTF-8, raw bytes otherwise.
*/

use crate::error::{Result, TrackerError};
use crate::tracking::ErrorVector;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire shape for the corrective error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorFormat {
    /// `{"x": <err_x>, "y": <err_y>}`
    #[default]
    Json,
    /// Two little-endian `i16`, rounded and saturated
    PackedI16,
}

impl ErrorFormat {
    /// Serialize `error` into `out`, replacing its contents
    pub fn write(&self, error: &ErrorVector, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        match self {
            ErrorFormat::Json => serde_json::to_writer(&mut *out, error)?,
            ErrorFormat::PackedI16 => {
                // `as` saturates out-of-range values and maps NaN to 0
                let x = error.x.round() as i16;
                let y = error.y.round() as i16;
                out.extend_from_slice(&x.to_le_bytes());
                out.extend_from_slice(&y.to_le_bytes());
            }
        }
        Ok(())
    }

    /// Parse an error payload as the motor controller would
    pub fn parse(&self, data: &[u8]) -> Result<ErrorVector> {
        match self {
            ErrorFormat::Json => Ok(serde_json::from_slice(data)?),
            ErrorFormat::PackedI16 => {
                let bytes: [u8; 4] = data.try_into().map_err(|_| {
                    TrackerError::invalid_message(format!("packed error needs 4 bytes, got {}", data.len()))
                })?;
                let x = i16::from_le_bytes([bytes[0], bytes[1]]);
                let y = i16::from_le_bytes([bytes[2], bytes[3]]);
                Ok(ErrorVector::new(f64::from(x), f64::from(y)))
            }
        }
    }
}

/// ASCII-tagged short message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggedMessage {
    Command(u8),
    Track(u8),
    Number(i32),
}

impl TaggedMessage {
    /// Wire text, e.g. `C:0x0A`
    pub fn encode(&self) -> String {
        match self {
            TaggedMessage::Command(code) => format!("C:0x{}", hex::encode_upper([*code])),
            TaggedMessage::Track(value) => format!("T:0x{}", hex::encode_upper([*value])),
            TaggedMessage::Number(value) => format!("N:{}", value),
        }
    }

    /// Parse a tagged payload.
    ///
    /// Needs at least three bytes with `:` second. Hex forms are exactly
    /// `X:0x` plus two hex digits; numbers are decimal `i32`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(TrackerError::invalid_message(format!(
                "tagged message too short ({} bytes)",
                data.len()
            )));
        }
        if data[1] != b':' {
            return Err(TrackerError::invalid_message("missing ':' after tag"));
        }

        let body = &data[2..];
        match data[0] {
            b'C' => parse_hex_byte(body).map(TaggedMessage::Command),
            b'T' => parse_hex_byte(body).map(TaggedMessage::Track),
            b'N' => std::str::from_utf8(body)
                .ok()
                .and_then(|s| s.parse::<i32>().ok())
                .map(TaggedMessage::Number)
                .ok_or_else(|| TrackerError::invalid_message("number tag needs a decimal integer")),
            tag => Err(TrackerError::invalid_message(format!("unknown tag {:?}", tag as char))),
        }
    }
}

fn parse_hex_byte(body: &[u8]) -> Result<u8> {
    match body {
        [b'0', b'x', digits @ ..] if digits.len() == 2 => {
            let decoded = hex::decode(digits)
                .map_err(|e| TrackerError::invalid_message(format!("bad hex digits: {}", e)))?;
            Ok(decoded[0])
        }
        _ => Err(TrackerError::invalid_message("hex tag needs 0x and two digits")),
    }
}

impl fmt::Display for TaggedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A received frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Raw(Bytes),
}

impl Payload {
    /// Decode as UTF-8 text, keeping the raw bytes when that fails
    pub fn from_bytes(bytes: Bytes) -> Self {
        match std::str::from_utf8(&bytes) {
            Ok(text) => Payload::Text(text.to_owned()),
            Err(_) => Payload::Raw(bytes),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Raw(_) => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => write!(f, "{:?}", text),
            Payload::Raw(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_shape() {
        let mut out = Vec::new();
        ErrorFormat::Json
            .write(&ErrorVector::new(-36.0, 4.5), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out.clone()).unwrap(), r#"{"x":-36.0,"y":4.5}"#);
        assert_eq!(ErrorFormat::Json.parse(&out).unwrap(), ErrorVector::new(-36.0, 4.5));

        // Integer-valued JSON from other senders still parses
        assert_eq!(
            ErrorFormat::Json.parse(br#"{"x": 5, "y": -3}"#).unwrap(),
            ErrorVector::new(5.0, -3.0)
        );
    }

    #[test]
    fn test_packed_error_rounds_and_saturates() {
        let mut out = Vec::new();
        ErrorFormat::PackedI16
            .write(&ErrorVector::new(-6.6, 40_000.0), &mut out)
            .unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), -7);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), i16::MAX);
        assert_eq!(
            ErrorFormat::PackedI16.parse(&out).unwrap(),
            ErrorVector::new(-7.0, f64::from(i16::MAX))
        );
        assert!(ErrorFormat::PackedI16.parse(&out[..3]).is_err());
    }

    #[test]
    fn test_tagged_encode() {
        assert_eq!(TaggedMessage::Command(0x01).encode(), "C:0x01");
        assert_eq!(TaggedMessage::Track(0x3f).encode(), "T:0x3F");
        assert_eq!(TaggedMessage::Number(-42).encode(), "N:-42");
        assert_eq!(TaggedMessage::Number(123).to_string(), "N:123");
    }

    #[test]
    fn test_tagged_parse() {
        assert_eq!(TaggedMessage::parse(b"C:0x01").unwrap(), TaggedMessage::Command(1));
        assert_eq!(TaggedMessage::parse(b"T:0x3f").unwrap(), TaggedMessage::Track(0x3F));
        assert_eq!(TaggedMessage::parse(b"N:123").unwrap(), TaggedMessage::Number(123));
        assert_eq!(TaggedMessage::parse(b"N:-7").unwrap(), TaggedMessage::Number(-7));
    }

    #[test]
    fn test_tagged_parse_rejects() {
        for bad in [
            &b"C:"[..],
            b"C-0x01",
            b"C:01",
            b"C:0x1",
            b"C:0x123",
            b"T:0xZZ",
            b"N:12a",
            b"X:0x01",
        ] {
            assert!(
                matches!(TaggedMessage::parse(bad), Err(TrackerError::InvalidMessage(_))),
                "{:?} should not parse",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn test_tagged_roundtrip_codes() {
        for code in [0u8, 0x0A, 0x7F, 0xFF] {
            let msg = TaggedMessage::Command(code);
            assert_eq!(TaggedMessage::parse(msg.encode().as_bytes()).unwrap(), msg);
        }
    }

    #[test]
    fn test_payload_text_fallback() {
        let text = Payload::from_bytes(Bytes::from_static(b"TRACK_PATH_POINT"));
        assert_eq!(text.as_text(), Some("TRACK_PATH_POINT"));

        let raw = Payload::from_bytes(Bytes::from_static(&[0xFF, 0xFE, 0x01]));
        assert_eq!(raw, Payload::Raw(Bytes::from_static(&[0xFF, 0xFE, 0x01])));
        assert_eq!(raw.as_text(), None);
        assert_eq!(raw.to_string(), "0xfffe01");
    }
}

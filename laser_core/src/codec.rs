/*!
Serial frame codec.

Wire format, one frame:

```text
+--------+--------+-----------------+------+
| 0xAA   | len    | payload[len]    | 0x55 |
+--------+--------+-----------------+------+
```

Sentinels are not escaped. The decoder counts payload bytes instead of
scanning for the tail, so sentinel values inside a payload are harmless.

Decoding is a byte-at-a-time state machine whose state survives between
reads, so frames split across any number of chunks are reassembled. A
frame with the wrong tail byte is dropped and the decoder goes back to
hunting for a header; the offending byte is not reused as a header.
*/

use crate::error::{Result, TrackerError};
use crate::protocol::{FRAME_HEADER, FRAME_TAIL, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
use bytes::{Bytes, BytesMut};
use std::io::Write;
use tracing::debug;

/// Frame encoder with a single reusable buffer.
///
/// One encoder lives as long as the serial link, so the hot loop never
/// allocates.
pub struct FrameEncoder {
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl FrameEncoder {
    pub const fn new() -> Self {
        let mut buf = [0u8; MAX_FRAME_LEN];
        buf[0] = FRAME_HEADER;
        Self { buf, len: 0 }
    }

    /// Frame `payload` into the internal buffer and return the frame bytes
    pub fn encode(&mut self, payload: &[u8]) -> Result<&[u8]> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(TrackerError::payload_too_large(payload.len()));
        }

        let end = 2 + payload.len();
        self.buf[1] = payload.len() as u8;
        self.buf[2..end].copy_from_slice(payload);
        self.buf[end] = FRAME_TAIL;
        self.len = end + 1;

        Ok(&self.buf[..self.len])
    }

    /// Frame `payload` and write it out in one call
    pub fn send_to<W: Write>(&mut self, payload: &[u8], writer: &mut W) -> Result<()> {
        let frame = self.encode(payload)?;
        writer.write_all(frame)?;
        Ok(())
    }

    /// Bytes of the most recently encoded frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame a payload into a freshly allocated buffer
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = FrameEncoder::new();
    Ok(encoder.encode(payload)?.to_vec())
}

/// Receiver parse phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePhase {
    /// Skipping bytes until a header sentinel
    SeekHeader,
    /// Next byte is the payload length
    ReadLength,
    /// Collecting payload bytes
    ReadPayload { remaining: u8 },
    /// Next byte must be the tail sentinel
    SeekTail,
}

/// Diagnostic counters kept by the receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub noise_bytes: u64,
}

/// Persistent decoder state for one serial link
#[derive(Debug, Clone)]
pub struct ReceiverState {
    phase: DecodePhase,
    payload: BytesMut,
    stats: DecoderStats,
}

impl ReceiverState {
    pub fn new() -> Self {
        Self {
            phase: DecodePhase::SeekHeader,
            payload: BytesMut::with_capacity(MAX_PAYLOAD_LEN),
            stats: DecoderStats::default(),
        }
    }

    pub fn phase(&self) -> DecodePhase {
        self.phase
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes of the frame currently being assembled
    pub fn pending(&self) -> &[u8] {
        &self.payload
    }

    /// Feed a chunk of raw input; returns every payload completed by it, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if let Some(frame) = self.push_byte(byte) {
                frames.push(frame);
            }
        }
        frames
    }

    fn push_byte(&mut self, byte: u8) -> Option<Bytes> {
        match self.phase {
            DecodePhase::SeekHeader => {
                if byte == FRAME_HEADER {
                    self.payload.clear();
                    self.phase = DecodePhase::ReadLength;
                } else {
                    self.stats.noise_bytes += 1;
                }
                None
            }
            DecodePhase::ReadLength => {
                self.phase = match byte {
                    0 => DecodePhase::SeekTail,
                    len => {
                        self.payload.reserve(len as usize);
                        DecodePhase::ReadPayload { remaining: len }
                    }
                };
                None
            }
            DecodePhase::ReadPayload { remaining } => {
                self.payload.extend_from_slice(&[byte]);
                self.phase = match remaining - 1 {
                    0 => DecodePhase::SeekTail,
                    remaining => DecodePhase::ReadPayload { remaining },
                };
                None
            }
            DecodePhase::SeekTail => {
                self.phase = DecodePhase::SeekHeader;
                if byte == FRAME_TAIL {
                    self.stats.frames_decoded += 1;
                    Some(self.payload.split().freeze())
                } else {
                    debug!(
                        "Dropping frame with bad tail {:#04x} ({} payload bytes)",
                        byte,
                        self.payload.len()
                    );
                    self.stats.frames_dropped += 1;
                    self.payload.clear();
                    None
                }
            }
        }
    }
}

impl Default for ReceiverState {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure form of [`ReceiverState::feed`]: old state and chunk in, new state and payloads out
pub fn decode(mut state: ReceiverState, chunk: &[u8]) -> (ReceiverState, Vec<Bytes>) {
    let frames = state.feed(chunk);
    (state, frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_of(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode(b"hi").unwrap();
        assert_eq!(frame, vec![0xAA, 2, b'h', b'i', 0x55]);
        assert_eq!(encode(b"").unwrap(), vec![0xAA, 0, 0x55]);
    }

    #[test]
    fn test_encode_rejects_oversize() {
        assert_eq!(encode(&payload_of(255)).unwrap().len(), 258);
        match encode(&payload_of(256)) {
            Err(TrackerError::PayloadTooLarge { len, max }) => {
                assert_eq!(len, 256);
                assert_eq!(max, 255);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_encoder_buffer_reuse() {
        let mut encoder = FrameEncoder::new();
        encoder.encode(b"a longer payload").unwrap();
        let frame = encoder.encode(b"x").unwrap().to_vec();
        assert_eq!(frame, vec![0xAA, 1, b'x', 0x55]);
        assert_eq!(encoder.as_bytes(), frame.as_slice());

        let mut out = Vec::new();
        encoder.send_to(b"ok", &mut out).unwrap();
        assert_eq!(out, vec![0xAA, 2, b'o', b'k', 0x55]);
    }

    #[test]
    fn test_roundtrip_all_lengths() {
        for len in 0..=MAX_PAYLOAD_LEN {
            let payload = payload_of(len);
            let (state, frames) = decode(ReceiverState::new(), &encode(&payload).unwrap());
            assert_eq!(frames.len(), 1, "length {}", len);
            assert_eq!(&frames[0][..], payload.as_slice());
            assert_eq!(state.phase(), DecodePhase::SeekHeader);
        }
    }

    #[test]
    fn test_fragmentation_invariance() {
        let payload = b"{\"x\": 12, \"y\": -4}".to_vec();
        let frame = encode(&payload).unwrap();

        // Every two-way split
        for cut in 0..=frame.len() {
            let mut state = ReceiverState::new();
            let mut frames = state.feed(&frame[..cut]);
            frames.extend(state.feed(&frame[cut..]));
            assert_eq!(frames, vec![Bytes::from(payload.clone())], "cut at {}", cut);
        }

        // One byte at a time
        let mut state = ReceiverState::new();
        let mut frames = Vec::new();
        for byte in &frame {
            frames.extend(state.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(frames, vec![Bytes::from(payload.clone())]);

        // Uneven chunks
        for size in 1..frame.len() {
            let mut state = ReceiverState::new();
            let frames: Vec<Bytes> = frame.chunks(size).flat_map(|c| state.feed(c)).collect();
            assert_eq!(frames.len(), 1);
            assert_eq!(&frames[0][..], payload.as_slice());
        }
    }

    #[test]
    fn test_many_frames_in_one_chunk() {
        let mut stream = vec![0x00, 0x13, 0x55];
        stream.extend(encode(b"one").unwrap());
        stream.extend(encode(b"").unwrap());
        stream.extend([0x42, 0x42]);
        stream.extend(encode(b"three").unwrap());

        let mut state = ReceiverState::new();
        let frames = state.feed(&stream);
        assert_eq!(frames, vec![Bytes::from_static(b"one"), Bytes::new(), Bytes::from_static(b"three")]);
        assert_eq!(state.stats().frames_decoded, 3);
        assert_eq!(state.stats().noise_bytes, 5);
    }

    #[test]
    fn test_sentinels_inside_payload() {
        let payload = [0xAA, 0x55, 0xAA, 0x00, 0x55];
        let mut state = ReceiverState::new();
        let frames = state.feed(&encode(&payload).unwrap());
        assert_eq!(frames, vec![Bytes::copy_from_slice(&payload)]);
    }

    #[test]
    fn test_bad_tail_resyncs_on_next_frame() {
        let mut corrupt = encode(b"bad").unwrap();
        let last = corrupt.len() - 1;
        corrupt[last] = 0x00;

        let mut stream = corrupt;
        stream.extend(encode(b"good").unwrap());

        let mut state = ReceiverState::new();
        let frames = state.feed(&stream);
        assert_eq!(frames, vec![Bytes::from_static(b"good")]);
        assert_eq!(state.stats().frames_dropped, 1);
        assert_eq!(state.stats().frames_decoded, 1);
        assert_eq!(state.phase(), DecodePhase::SeekHeader);
    }

    #[test]
    fn test_bad_tail_byte_is_not_a_header() {
        // The 0xAA in the tail slot is discarded, so the bytes after it are noise
        let stream = [0xAA, 1, 0x42, 0xAA, 1, 0x43, 0x55];
        let mut state = ReceiverState::new();
        assert!(state.feed(&stream).is_empty());
        assert_eq!(state.stats().frames_dropped, 1);

        // A fresh header right after the bad tail is picked up
        let stream = [0xAA, 1, 0x42, 0xAA, 0xAA, 1, 0x43, 0x55];
        let mut state = ReceiverState::new();
        assert_eq!(state.feed(&stream), vec![Bytes::from_static(&[0x43])]);
    }

    #[test]
    fn test_partial_frame_is_held() {
        let frame = encode(b"split").unwrap();
        let mut state = ReceiverState::new();
        assert!(state.feed(&frame[..4]).is_empty());
        assert_eq!(state.phase(), DecodePhase::ReadPayload { remaining: 3 });
        assert_eq!(state.pending(), b"sp");

        let (state, frames) = decode(state, &frame[4..]);
        assert_eq!(frames, vec![Bytes::from_static(b"split")]);
        assert!(state.pending().is_empty());
    }
}

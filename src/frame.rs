//! Audio frames as handed out by a frame source.

use bytes::{Bytes, BytesMut};

use crate::types::{BYTES_PER_SAMPLE, Direction};

/// One discrete unit of signed 16-bit little-endian audio.
///
/// Each frame becomes exactly one binary message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    direction: Direction,
    payload: Bytes,
}

impl Frame {
    /// Create a frame for the given leg.
    pub fn new(direction: Direction, payload: impl Into<Bytes>) -> Self {
        Self {
            direction,
            payload: payload.into(),
        }
    }

    /// Create a frame of `samples` silent samples.
    pub fn silence(direction: Direction, samples: usize) -> Self {
        Self::new(direction, BytesMut::zeroed(samples * BYTES_PER_SAMPLE).freeze())
    }

    /// Leg this frame was taken from.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Raw payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of whole samples in the payload.
    pub fn samples(&self) -> usize {
        self.payload.len() / BYTES_PER_SAMPLE
    }

    /// Replace the payload with silence of the same length.
    pub fn silenced(self) -> Self {
        Self::new(self.direction, BytesMut::zeroed(self.payload.len()).freeze())
    }

    /// Apply a gain factor as produced by [`crate::types::volume_factor`].
    ///
    /// Samples saturate at the i16 range. A trailing odd byte is kept as is.
    pub fn with_volume(self, factor: i32) -> Self {
        if factor == 0 || self.payload.is_empty() {
            return self;
        }

        let mut out = BytesMut::with_capacity(self.payload.len());
        let mut chunks = self.payload.chunks_exact(BYTES_PER_SAMPLE);
        for chunk in &mut chunks {
            let sample = i32::from(i16::from_le_bytes([chunk[0], chunk[1]]));
            let adjusted = if factor > 0 {
                sample * factor
            } else {
                sample / -factor
            };
            let clamped = adjusted.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            out.extend_from_slice(&clamped.to_le_bytes());
        }
        out.extend_from_slice(chunks.remainder());

        Self::new(self.direction, out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[i16]) -> Bytes {
        values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>().into()
    }

    #[test]
    fn test_silence() {
        let frame = Frame::silence(Direction::In, 160);
        assert_eq!(frame.len(), 320);
        assert_eq!(frame.samples(), 160);
        assert!(frame.payload().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_silenced_keeps_length() {
        let frame = Frame::new(Direction::Out, samples(&[100, -100, 7]));
        let silent = frame.silenced();
        assert_eq!(silent.len(), 6);
        assert_eq!(silent.direction(), Direction::Out);
        assert!(silent.payload().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_volume_up_saturates() {
        let frame = Frame::new(Direction::In, samples(&[100, -100, 20_000, -20_000]));
        let louder = frame.with_volume(4);
        assert_eq!(
            louder.payload(),
            &samples(&[400, -400, i16::MAX, i16::MIN])
        );
    }

    #[test]
    fn test_volume_down() {
        let frame = Frame::new(Direction::In, samples(&[100, -100, 3]));
        let quieter = frame.with_volume(-2);
        assert_eq!(quieter.payload(), &samples(&[50, -50, 1]));
    }

    #[test]
    fn test_zero_factor_is_identity() {
        let frame = Frame::new(Direction::Both, samples(&[1, 2, 3]));
        assert_eq!(frame.clone().with_volume(0), frame);
    }
}

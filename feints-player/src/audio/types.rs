//! Core audio data types
//!
//! All audio handed to the encoder is 48 kHz, stereo, signed 16-bit little-endian PCM,
//! cut into 20 ms frames.

use bytes::Bytes;
use std::time::Duration;

/// Output sample rate (Hz)
pub const SAMPLE_RATE: u32 = 48_000;

/// Output channel count (interleaved stereo)
pub const CHANNELS: usize = 2;

/// Samples per channel in one frame (20 ms at 48 kHz)
pub const FRAME_SAMPLES: usize = 960;

/// Interleaved samples in one frame
pub const FRAME_SAMPLES_INTERLEAVED: usize = FRAME_SAMPLES * CHANNELS;

/// Bytes of s16le PCM in one frame
pub const FRAME_BYTES: usize = FRAME_SAMPLES_INTERLEAVED * 2;

/// Wall-clock length of one frame
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// One encoded 20 ms audio frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// 0-based frame number within the track
    pub index: u64,
    /// Encoded bytes
    pub payload: Bytes,
}

/// Decode little-endian s16 PCM bytes into interleaved samples
///
/// `bytes.len()` must be even; a trailing odd byte is ignored.
pub fn samples_from_le_bytes(bytes: &[u8], out: &mut Vec<i16>) {
    out.clear();
    out.extend(
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
    );
}

/// Playback time covered by `frames` frames
pub fn frames_to_duration(frames: u64) -> Duration {
    Duration::from_millis(frames.saturating_mul(FRAME_DURATION.as_millis() as u64))
}

//! PCM to Opus frame encoding
//!
//! One encoder instance lives for exactly one track: the worker asks the factory for a
//! fresh encoder at track start, so codec state never leaks between tracks.

use crate::audio::types::{EncodedFrame, FRAME_SAMPLES_INTERLEAVED, SAMPLE_RATE};
use crate::config::{EncoderApplication, EncoderConfig};
use crate::error::TrackError;
use bytes::Bytes;
use opus::{Application, Bitrate, Channels};

/// Largest Opus packet we accept from libopus (recommended upper bound)
const MAX_PACKET_BYTES: usize = 4000;

/// Encodes one 20 ms frame of interleaved stereo PCM
pub trait FrameEncoder: Send {
    /// Encode exactly `FRAME_SAMPLES_INTERLEAVED` samples into a frame numbered `index`
    fn encode(&mut self, index: u64, pcm: &[i16]) -> Result<EncodedFrame, TrackError>;
}

/// Creates a fresh encoder per track
pub trait EncoderFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn FrameEncoder>, TrackError>;
}

/// Factory for libopus-backed encoders
#[derive(Debug, Clone)]
pub struct OpusEncoderFactory {
    bitrate: Option<i32>,
    application: EncoderApplication,
}

impl OpusEncoderFactory {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            bitrate: config.bitrate,
            application: config.application,
        }
    }
}

impl EncoderFactory for OpusEncoderFactory {
    fn create(&self) -> Result<Box<dyn FrameEncoder>, TrackError> {
        let application = match self.application {
            EncoderApplication::Voip => Application::Voip,
            EncoderApplication::Audio => Application::Audio,
            EncoderApplication::LowDelay => Application::LowDelay,
        };

        let mut inner = opus::Encoder::new(SAMPLE_RATE, Channels::Stereo, application)
            .map_err(|e| TrackError::Encode(format!("failed to create Opus encoder: {}", e)))?;

        if let Some(bits) = self.bitrate {
            inner
                .set_bitrate(Bitrate::Bits(bits))
                .map_err(|e| TrackError::Encode(format!("invalid bitrate {}: {}", bits, e)))?;
        }

        Ok(Box::new(OpusFrameEncoder {
            inner,
            packet: vec![0u8; MAX_PACKET_BYTES],
        }))
    }
}

/// libopus encoder for 48 kHz stereo 20 ms frames
pub struct OpusFrameEncoder {
    inner: opus::Encoder,
    packet: Vec<u8>,
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, index: u64, pcm: &[i16]) -> Result<EncodedFrame, TrackError> {
        if pcm.len() != FRAME_SAMPLES_INTERLEAVED {
            return Err(TrackError::Encode(format!(
                "frame {} has {} samples, expected {}",
                index,
                pcm.len(),
                FRAME_SAMPLES_INTERLEAVED
            )));
        }

        let written = self
            .inner
            .encode(pcm, &mut self.packet)
            .map_err(|e| TrackError::Encode(format!("frame {}: {}", index, e)))?;

        Ok(EncodedFrame {
            index,
            payload: Bytes::copy_from_slice(&self.packet[..written]),
        })
    }
}

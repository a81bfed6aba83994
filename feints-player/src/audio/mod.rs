//! Audio pipeline building blocks
//!
//! - `types`: frame geometry constants and the encoded frame type
//! - `encoder`: PCM frame to Opus packet
//! - `source` / `ffmpeg`: where decoded PCM comes from
//! - `sink` / `rtp`: where encoded frames go

pub mod encoder;
pub mod ffmpeg;
pub mod rtp;
pub mod sink;
pub mod source;
pub mod types;

pub use encoder::{EncoderFactory, FrameEncoder, OpusEncoderFactory};
pub use ffmpeg::FfmpegResolver;
pub use rtp::RtpSinkProvider;
pub use sink::{ChannelSink, ChannelSinkProvider, OutputSink, SinkError, SinkProvider};
pub use source::{ResolvedSource, SourceCleanup, SourceResolver};
pub use types::EncodedFrame;

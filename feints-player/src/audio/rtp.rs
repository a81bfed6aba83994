//! RTP/UDP output sink
//!
//! Wraps each Opus frame in a 12-byte RTP v2 header (RFC 3550, Opus payload format per
//! RFC 7587) and sends it as one UDP datagram. Sequence numbers and timestamps run
//! continuously across tracks of a session; the SSRC is derived from the session key.

use crate::audio::sink::{OutputSink, SinkError, SinkProvider};
use crate::audio::types::{EncodedFrame, FRAME_SAMPLES};
use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::playback::types::SessionKey;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::UdpSocket;
use tracing::info;

/// RTP fixed header length
pub const RTP_HEADER_LEN: usize = 12;

const RTP_VERSION: u8 = 2;

/// Fields of the fixed RTP header that change per packet or per stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub payload_type: u8,
    pub marker: bool,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(RTP_VERSION << 6);
        out.push(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
    }
}

/// Build one RTP datagram
pub fn build_packet(header: &RtpHeader, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(RTP_HEADER_LEN + payload.len());
    header.write(&mut packet);
    packet.extend_from_slice(payload);
    packet
}

/// Stable SSRC for a session
pub fn ssrc_for(key: &SessionKey) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    (hash as u32) ^ ((hash >> 32) as u32)
}

#[derive(Debug)]
struct StreamPosition {
    sequence: u16,
    timestamp: u32,
    first: bool,
}

/// Sends frames of one session to a fixed UDP destination
#[derive(Debug)]
pub struct RtpUdpSink {
    socket: UdpSocket,
    target: SocketAddr,
    payload_type: u8,
    ssrc: u32,
    position: Mutex<StreamPosition>,
}

impl RtpUdpSink {
    pub async fn bind(target: SocketAddr, payload_type: u8, ssrc: u32) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;

        Ok(Self {
            socket,
            target,
            payload_type,
            ssrc,
            position: Mutex::new(StreamPosition {
                sequence: 0,
                timestamp: 0,
                first: true,
            }),
        })
    }

    /// Header for the next packet; advances the stream position
    fn next_header(&self) -> RtpHeader {
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        let header = RtpHeader {
            payload_type: self.payload_type,
            marker: position.first,
            sequence: position.sequence,
            timestamp: position.timestamp,
            ssrc: self.ssrc,
        };
        position.first = false;
        position.sequence = position.sequence.wrapping_add(1);
        position.timestamp = position.timestamp.wrapping_add(FRAME_SAMPLES as u32);
        header
    }
}

#[async_trait]
impl OutputSink for RtpUdpSink {
    async fn send(&self, frame: EncodedFrame) -> std::result::Result<(), SinkError> {
        let packet = build_packet(&self.next_header(), &frame.payload);

        match self.socket.send_to(&packet, self.target).await {
            Ok(_) => Ok(()),
            // Nobody listening yet (ICMP port unreachable) or socket buffer full: drop this one
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::ConnectionRefused) => {
                Err(SinkError::Full)
            }
            Err(e) => Err(SinkError::Unavailable(format!(
                "UDP send to {} failed: {}",
                self.target, e
            ))),
        }
    }
}

/// Opens one `RtpUdpSink` per session, all aimed at the configured target
#[derive(Debug, Clone)]
pub struct RtpSinkProvider {
    target: SocketAddr,
    payload_type: u8,
}

impl RtpSinkProvider {
    /// Resolve the configured `host:port` target
    pub async fn from_config(config: &OutputConfig) -> Result<Self> {
        let target = tokio::net::lookup_host(config.rtp_target.as_str())
            .await
            .map_err(|e| Error::Config(format!("Invalid rtp_target {}: {}", config.rtp_target, e)))?
            .next()
            .ok_or_else(|| {
                Error::Config(format!("rtp_target {} did not resolve", config.rtp_target))
            })?;

        Ok(Self {
            target,
            payload_type: config.payload_type,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl SinkProvider for RtpSinkProvider {
    async fn open(&self, key: &SessionKey) -> Result<Arc<dyn OutputSink>> {
        let ssrc = ssrc_for(key);
        let sink = RtpUdpSink::bind(self.target, self.payload_type, ssrc)
            .await
            .map_err(|e| Error::Sink(format!("failed to open RTP sink for {}: {}", key, e)))?;

        info!(session = %key, target = %self.target, ssrc, "Opened RTP sink");
        Ok(Arc::new(sink))
    }
}

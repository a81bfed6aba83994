//! Test helper modules for feints-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - MemoryResolver: scripted in-memory PCM sources (locator encodes the behavior)
//! - MarkerEncoderFactory: "encodes" a frame as its first sample, so content order is visible
//! - RecordingSink and friends: sinks that record, refuse or stall
//! - EventRecorder: collects EventBus traffic for assertions

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use feints_common::events::{EventBus, FeintsEvent};
use feints_player::audio::encoder::{EncoderFactory, FrameEncoder};
use feints_player::audio::sink::{OutputSink, SinkError, SinkProvider};
use feints_player::audio::source::{ResolvedSource, SourceCleanup, SourceResolver};
use feints_player::audio::types::{EncodedFrame, FRAME_BYTES, FRAME_SAMPLES_INTERLEAVED};
use feints_player::playback::{
    PlaybackEngine, PlaybackSnapshot, SessionKey, Track, WorkerContext, WorkerSettings,
};
use feints_player::{Result, TrackError};
use feints_common::events::PlaybackState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::DuplexStream;

/// Generous upper bound for anything that should happen "soon"
pub const WAIT: Duration = Duration::from_secs(5);

/// Settings used by all tests: quick drop decisions, short teardown
pub fn test_settings() -> WorkerSettings {
    WorkerSettings {
        sink_send_timeout: Duration::from_millis(50),
        teardown_grace: Duration::from_millis(500),
    }
}

// ============================================================================
// Locators
// ============================================================================

/// `count` full frames whose samples all equal `base + frame_index`
pub fn frames(count: u64, base: i16) -> String {
    format!("frames:{}@{}", count, base)
}

/// `count` full frames plus `extra_bytes` of a trailing partial frame
pub fn frames_with_tail(count: u64, extra_bytes: usize, base: i16) -> String {
    format!("frames:{}+{}@{}", count, extra_bytes, base)
}

pub const FAIL_RESOLVE: &str = "fail";
/// Source that never produces data until torn down
pub const STALL: &str = "stall";
/// Resolve that takes far longer than any test
pub const SLOW_RESOLVE: &str = "slow-resolve";
/// Resolver panics
pub const PANIC: &str = "panic";
/// Source fed by the test through `MemoryResolver::take_gate`
pub const GATED: &str = "gated";

pub fn track(locator: impl Into<String>, title: &str) -> Track {
    Track::new(locator, title).expect("valid test track")
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Default)]
pub struct SourceStats {
    pub resolved: AtomicUsize,
    pub cleaned_up: AtomicUsize,
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
}

/// Resolves scripted locators into in-memory PCM
#[derive(Debug, Default)]
pub struct MemoryResolver {
    pub stats: Arc<SourceStats>,
    /// How long each source takes to tear down
    cleanup_delay: Duration,
    gates: Mutex<Vec<DuplexStream>>,
}

impl MemoryResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sources whose teardown takes `delay`
    pub fn with_cleanup_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            cleanup_delay: delay,
            ..Self::default()
        })
    }

    /// Writer end of the most recently resolved `GATED` source
    pub fn take_gate(&self) -> Option<DuplexStream> {
        self.gates.lock().expect("gates lock").pop()
    }

    pub fn resolved(&self) -> usize {
        self.stats.resolved.load(Ordering::SeqCst)
    }

    pub fn cleaned_up(&self) -> usize {
        self.stats.cleaned_up.load(Ordering::SeqCst)
    }

    /// Highest number of sources open at the same time
    pub fn max_open(&self) -> usize {
        self.stats.max_open.load(Ordering::SeqCst)
    }

    fn opened(&self, writer: Option<DuplexStream>) -> Box<dyn SourceCleanup> {
        self.stats.resolved.fetch_add(1, Ordering::SeqCst);
        let now_open = self.stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_open.fetch_max(now_open, Ordering::SeqCst);
        Box::new(CountingCleanup {
            stats: Arc::clone(&self.stats),
            delay: self.cleanup_delay,
            _writer: writer,
        })
    }
}

/// Build the PCM bytes for a `frames:` locator
pub fn pcm_for(count: u64, extra_bytes: usize, base: i16) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(count as usize * FRAME_BYTES + extra_bytes);
    for i in 0..count {
        let value = base.wrapping_add(i as i16).to_le_bytes();
        for _ in 0..FRAME_SAMPLES_INTERLEAVED {
            pcm.extend_from_slice(&value);
        }
    }
    let tail = base.wrapping_add(count as i16).to_le_bytes();
    for i in 0..extra_bytes {
        pcm.push(tail[i % 2]);
    }
    pcm
}

fn parse_frames(spec: &str) -> Option<(u64, usize, i16)> {
    let (body, base) = match spec.split_once('@') {
        Some((body, base)) => (body, base.parse().ok()?),
        None => (spec, 0),
    };
    let (count, extra) = match body.split_once('+') {
        Some((count, extra)) => (count.parse().ok()?, extra.parse().ok()?),
        None => (body.parse().ok()?, 0),
    };
    Some((count, extra, base))
}

#[async_trait]
impl SourceResolver for MemoryResolver {
    async fn resolve(&self, track: &Track) -> std::result::Result<ResolvedSource, TrackError> {
        let locator = track.locator();

        if let Some(spec) = locator.strip_prefix("frames:") {
            let (count, extra, base) = parse_frames(spec)
                .ok_or_else(|| TrackError::Resolve(format!("bad test locator {}", locator)))?;
            let reader = std::io::Cursor::new(pcm_for(count, extra, base));
            return Ok(ResolvedSource::new(Box::new(reader), self.opened(None)));
        }

        match locator {
            FAIL_RESOLVE => Err(TrackError::Resolve("scripted failure".to_string())),
            STALL => {
                let (reader, writer) = tokio::io::duplex(64);
                Ok(ResolvedSource::new(Box::new(reader), self.opened(Some(writer))))
            }
            GATED => {
                let (reader, writer) = tokio::io::duplex(FRAME_BYTES * 4);
                self.gates.lock().expect("gates lock").push(writer);
                Ok(ResolvedSource::new(Box::new(reader), self.opened(None)))
            }
            SLOW_RESOLVE => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(TrackError::Resolve("slow resolve gave up".to_string()))
            }
            PANIC => panic!("scripted resolver panic"),
            other => Err(TrackError::Resolve(format!("unknown test locator {}", other))),
        }
    }
}

struct CountingCleanup {
    stats: Arc<SourceStats>,
    delay: Duration,
    /// Keeps a stalled source open until teardown
    _writer: Option<DuplexStream>,
}

#[async_trait]
impl SourceCleanup for CountingCleanup {
    async fn shutdown(self: Box<Self>, _grace: Duration) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.stats.open.fetch_sub(1, Ordering::SeqCst);
        self.stats.cleaned_up.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Encoders
// ============================================================================

/// Payload = first sample of the frame, little-endian
#[derive(Debug, Default)]
pub struct MarkerEncoderFactory {
    /// Fail with an encode error when asked for this frame index
    pub fail_at: Option<u64>,
}

impl MarkerEncoderFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_at(index: u64) -> Arc<Self> {
        Arc::new(Self { fail_at: Some(index) })
    }
}

impl EncoderFactory for MarkerEncoderFactory {
    fn create(&self) -> std::result::Result<Box<dyn FrameEncoder>, TrackError> {
        Ok(Box::new(MarkerEncoder { fail_at: self.fail_at }))
    }
}

struct MarkerEncoder {
    fail_at: Option<u64>,
}

impl FrameEncoder for MarkerEncoder {
    fn encode(&mut self, index: u64, pcm: &[i16]) -> std::result::Result<EncodedFrame, TrackError> {
        if pcm.len() != FRAME_SAMPLES_INTERLEAVED {
            return Err(TrackError::Encode(format!("bad frame size {}", pcm.len())));
        }
        if self.fail_at == Some(index) {
            return Err(TrackError::Encode(format!("scripted failure at frame {}", index)));
        }
        Ok(EncodedFrame {
            index,
            payload: Bytes::copy_from_slice(&pcm[0].to_le_bytes()),
        })
    }
}

/// Decode the marker payload back into the sample value
pub fn marker(frame: &EncodedFrame) -> i16 {
    i16::from_le_bytes([frame.payload[0], frame.payload[1]])
}

// ============================================================================
// Sinks
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentFrame {
    pub index: u64,
    pub marker: i16,
    pub at: Instant,
}

/// Records every frame it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<SentFrame>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.frames.lock().expect("sink lock").clone()
    }

    pub fn markers(&self) -> Vec<i16> {
        self.frames().iter().map(|f| f.marker).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().expect("sink lock").len()
    }

    /// Wait until at least `count` frames arrived
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.len() >= count).await
    }

    /// Wait until a frame with this marker arrived
    pub async fn wait_for_marker(&self, value: i16, timeout: Duration) -> bool {
        wait_until(timeout, || self.markers().contains(&value)).await
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn send(&self, frame: EncodedFrame) -> std::result::Result<(), SinkError> {
        let sent = SentFrame {
            index: frame.index,
            marker: marker(&frame),
            at: Instant::now(),
        };
        self.frames.lock().expect("sink lock").push(sent);
        Ok(())
    }
}

/// Transport is gone
#[derive(Debug, Default)]
pub struct UnavailableSink;

#[async_trait]
impl OutputSink for UnavailableSink {
    async fn send(&self, _frame: EncodedFrame) -> std::result::Result<(), SinkError> {
        Err(SinkError::Unavailable("voice connection closed".to_string()))
    }
}

/// Permanently backpressured
#[derive(Debug, Default)]
pub struct FullSink;

#[async_trait]
impl OutputSink for FullSink {
    async fn send(&self, _frame: EncodedFrame) -> std::result::Result<(), SinkError> {
        Err(SinkError::Full)
    }
}

/// Every send takes longer than the send deadline
#[derive(Debug, Default)]
pub struct StalledSink;

#[async_trait]
impl OutputSink for StalledSink {
    async fn send(&self, _frame: EncodedFrame) -> std::result::Result<(), SinkError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(())
    }
}

/// Hands out one RecordingSink per session and remembers them
#[derive(Debug, Default)]
pub struct RecordingSinkProvider {
    sinks: Mutex<HashMap<SessionKey, Arc<RecordingSink>>>,
    opened: AtomicUsize,
}

impl RecordingSinkProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sink_for(&self, key: &SessionKey) -> Option<Arc<RecordingSink>> {
        self.sinks.lock().expect("provider lock").get(key).cloned()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkProvider for RecordingSinkProvider {
    async fn open(&self, key: &SessionKey) -> Result<Arc<dyn OutputSink>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let sink = RecordingSink::new();
        self.sinks
            .lock()
            .expect("provider lock")
            .insert(key.clone(), Arc::clone(&sink));
        Ok(sink as Arc<dyn OutputSink>)
    }
}

// ============================================================================
// Engines and events
// ============================================================================

pub fn context(
    resolver: Arc<MemoryResolver>,
    encoder_factory: Arc<MarkerEncoderFactory>,
    sink: Arc<dyn OutputSink>,
) -> WorkerContext {
    WorkerContext {
        resolver,
        encoder_factory,
        sink,
        settings: test_settings(),
    }
}

pub struct TestEngine {
    pub engine: PlaybackEngine,
    pub resolver: Arc<MemoryResolver>,
    pub events: EventRecorder,
}

/// Engine with a MemoryResolver, MarkerEncoder and the given sink
pub fn spawn_engine(sink: Arc<dyn OutputSink>) -> TestEngine {
    spawn_engine_with(sink, MarkerEncoderFactory::new())
}

pub fn spawn_engine_with(
    sink: Arc<dyn OutputSink>,
    encoder_factory: Arc<MarkerEncoderFactory>,
) -> TestEngine {
    spawn_engine_using(sink, encoder_factory, MemoryResolver::new())
}

pub fn spawn_engine_using(
    sink: Arc<dyn OutputSink>,
    encoder_factory: Arc<MarkerEncoderFactory>,
    resolver: Arc<MemoryResolver>,
) -> TestEngine {
    let bus = Arc::new(EventBus::new(1024));
    let events = EventRecorder::start(&bus);
    let key = SessionKey::new("guild:test").expect("key");
    let ctx = context(Arc::clone(&resolver), encoder_factory, sink);
    let engine = PlaybackEngine::spawn(key, ctx, bus);

    TestEngine {
        engine,
        resolver,
        events,
    }
}

/// Poll `engine.query()` until `pred` holds
pub async fn wait_for_snapshot<F>(
    engine: &PlaybackEngine,
    timeout: Duration,
    mut pred: F,
) -> PlaybackSnapshot
where
    F: FnMut(&PlaybackSnapshot) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let snapshot = engine.query().await.expect("engine alive");
        if pred(&snapshot) {
            return snapshot;
        }
        if Instant::now() >= deadline {
            panic!("condition not reached within {:?}, last snapshot: {:?}", timeout, snapshot);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(engine: &PlaybackEngine, state: PlaybackState) -> PlaybackSnapshot {
    wait_for_snapshot(engine, WAIT, |s| s.state == state).await
}

/// Collects every event published on a bus
#[derive(Clone)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<FeintsEvent>>>,
}

impl EventRecorder {
    pub fn start(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut rx = bus.subscribe();
        let sink = Arc::clone(&events);
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                sink.lock().expect("events lock").push(event);
            }
        });
        Self { events }
    }

    pub fn all(&self) -> Vec<FeintsEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn count<F: Fn(&FeintsEvent) -> bool>(&self, pred: F) -> usize {
        self.all().iter().filter(|e| pred(e)).count()
    }

    pub async fn wait_for<F: Fn(&FeintsEvent) -> bool>(&self, timeout: Duration, pred: F) -> bool {
        wait_until(timeout, || self.all().iter().any(&pred)).await
    }
}

/// Poll `cond` every 5 ms until it holds or `timeout` passes
pub async fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

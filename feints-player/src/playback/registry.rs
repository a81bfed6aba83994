//! Session registry: one playback engine per session key
//!
//! Engines are created lazily on first use and live until removed, retired by the idle
//! reaper, or shut down with the registry. The map lock is held across check-and-insert and
//! across every engine shutdown, so concurrent callers for the same key always get the same
//! engine and a replacement never overlaps the engine it replaces.

use crate::audio::encoder::EncoderFactory;
use crate::audio::sink::SinkProvider;
use crate::audio::source::SourceResolver;
use crate::error::Result;
use crate::playback::engine::PlaybackEngine;
use crate::playback::types::{Command, SessionKey};
use crate::playback::worker::{WorkerContext, WorkerSettings};
use feints_common::events::EventBus;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Maps session keys to their engines
pub struct EngineRegistry {
    engines: Mutex<HashMap<SessionKey, PlaybackEngine>>,
    resolver: Arc<dyn SourceResolver>,
    encoder_factory: Arc<dyn EncoderFactory>,
    sink_provider: Arc<dyn SinkProvider>,
    settings: WorkerSettings,
    events: Arc<EventBus>,
}

impl EngineRegistry {
    pub fn new(
        resolver: Arc<dyn SourceResolver>,
        encoder_factory: Arc<dyn EncoderFactory>,
        sink_provider: Arc<dyn SinkProvider>,
        settings: WorkerSettings,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            resolver,
            encoder_factory,
            sink_provider,
            settings,
            events,
        }
    }

    /// Event bus shared by every engine of this registry
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Existing live engine for `key`, or a freshly spawned idle one
    pub async fn get_or_create(&self, key: &SessionKey) -> Result<PlaybackEngine> {
        let mut engines = self.engines.lock().await;
        self.get_or_create_locked(&mut engines, key).await
    }

    async fn get_or_create_locked(
        &self,
        engines: &mut HashMap<SessionKey, PlaybackEngine>,
        key: &SessionKey,
    ) -> Result<PlaybackEngine> {
        if let Some(engine) = engines.get(key) {
            if !engine.is_closed() {
                return Ok(engine.clone());
            }
            debug!(session = %key, "Replacing closed engine");
        }

        let sink = self.sink_provider.open(key).await?;
        let ctx = WorkerContext {
            resolver: Arc::clone(&self.resolver),
            encoder_factory: Arc::clone(&self.encoder_factory),
            sink,
            settings: self.settings,
        };

        let engine = PlaybackEngine::spawn(key.clone(), ctx, Arc::clone(&self.events));
        engines.insert(key.clone(), engine.clone());
        info!(session = %key, sessions = engines.len(), "Session created");
        Ok(engine)
    }

    /// Submit a command to the session's engine, creating the engine if needed
    ///
    /// Runs under the registry lock, so it cannot interleave with the idle reaper: the command
    /// lands either before a retire request (and keeps the engine alive) or in a new engine.
    pub async fn submit(&self, key: &SessionKey, command: Command) -> Result<PlaybackEngine> {
        let mut engines = self.engines.lock().await;
        let engine = self.get_or_create_locked(&mut engines, key).await?;
        engine.submit(command)?;
        Ok(engine)
    }

    /// Live engine for `key`, if any
    pub async fn get(&self, key: &SessionKey) -> Option<PlaybackEngine> {
        let engines = self.engines.lock().await;
        engines.get(key).filter(|engine| !engine.is_closed()).cloned()
    }

    /// Keys of all live sessions, sorted
    pub async fn sessions(&self) -> Vec<SessionKey> {
        let engines = self.engines.lock().await;
        let mut keys: Vec<SessionKey> = engines
            .iter()
            .filter(|(_, engine)| !engine.is_closed())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Shut down and forget the engine for `key`; returns false if there was none
    ///
    /// The map lock is held until the actor has exited, so a command for the same key waits
    /// for the old engine's worker to tear down before a new engine is created.
    pub async fn remove(&self, key: &SessionKey) -> bool {
        let mut engines = self.engines.lock().await;
        let Some(engine) = engines.get(key).cloned() else {
            return false;
        };

        engine.shutdown().await;
        engines.remove(key);
        info!(session = %key, sessions = engines.len(), "Session removed");
        true
    }

    /// Retire every engine that has been quiescent for at least `idle_for`
    pub async fn reap_idle(&self, idle_for: Duration) -> Vec<SessionKey> {
        let mut engines = self.engines.lock().await;
        let mut reaped = Vec::new();

        let candidates: Vec<(SessionKey, PlaybackEngine)> = engines
            .iter()
            .map(|(key, engine)| (key.clone(), engine.clone()))
            .collect();

        for (key, engine) in candidates {
            if engine.retire_if_idle(idle_for).await {
                engines.remove(&key);
                reaped.push(key);
            }
        }

        if !reaped.is_empty() {
            info!(reaped = reaped.len(), remaining = engines.len(), "Reaped idle sessions");
        }
        reaped
    }

    /// Periodically reap idle engines until the registry is dropped
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        idle_for: Duration,
    ) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    debug!("Registry dropped, stopping reaper");
                    break;
                };
                registry.reap_idle(idle_for).await;
            }
        })
    }

    /// Shut down every engine
    pub async fn shutdown(&self) {
        let mut engines = self.engines.lock().await;
        info!(sessions = engines.len(), "Shutting down all sessions");

        futures::future::join_all(engines.values().map(PlaybackEngine::shutdown)).await;
        engines.clear();
    }
}

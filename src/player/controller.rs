//! Playback controller
//!
//! Owns the engine for the current session and executes the effects the
//! state machine asks for. Events from the engine, the element and the
//! timers all arrive on one channel and are handled one at a time.

use super::engine::{
    EngineConfig, EngineEvents, EngineFactory, EventSink, MediaEngine, Overlay, Scheduler,
    VideoElement,
};
use super::state::{Capabilities, Effect, PlaybackMachine, PlaybackState, PlayerEvent, TimerToken};
use crate::config::RelayConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What the page needs to start playback
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    /// Manifest URL, normally a path on the relay
    pub stream_url: String,
    pub engine: EngineConfig,
}

impl PlayerConfig {
    pub fn new(stream_url: impl Into<String>) -> Self {
        PlayerConfig {
            stream_url: stream_url.into(),
            engine: EngineConfig::default(),
        }
    }

    /// Point the player at the relay's channel manifest
    pub fn for_relay(config: &RelayConfig) -> Self {
        Self::new(format!("{}{}", config.route_prefix(), config.stream_path))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Scheduler backed by tokio one-shot sleeps
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    events: EventSink,
}

impl TokioScheduler {
    pub fn new(events: EventSink) -> Self {
        TokioScheduler { events }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the controller stopped
            let _ = events.send(PlayerEvent::TimerFired(token));
        });
    }
}

/// Drives one video surface
pub struct PlaybackController<F, V, O, S>
where
    F: EngineFactory,
{
    config: PlayerConfig,
    machine: PlaybackMachine,
    factory: F,
    engine: Option<F::Engine>,
    element: V,
    overlay: O,
    scheduler: S,
    events: EventSink,
}

impl<F, V, O, S> PlaybackController<F, V, O, S>
where
    F: EngineFactory,
    V: VideoElement,
    O: Overlay,
    S: Scheduler,
{
    /// Create a controller; capabilities are probed once here
    pub fn new(
        config: PlayerConfig,
        factory: F,
        element: V,
        overlay: O,
        scheduler: S,
        events: EventSink,
    ) -> Self {
        let capabilities = Capabilities {
            engine_supported: factory.is_supported(),
            native_hls: element.can_play_native_hls(),
        };
        debug!("Player capabilities: {:?}", capabilities);

        PlaybackController {
            config,
            machine: PlaybackMachine::new(capabilities),
            factory,
            engine: None,
            element,
            overlay,
            scheduler,
            events,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.machine.state()
    }

    pub fn machine(&self) -> &PlaybackMachine {
        &self.machine
    }

    pub fn engine(&self) -> Option<&F::Engine> {
        self.engine.as_ref()
    }

    pub fn element(&self) -> &V {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut V {
        &mut self.element
    }

    pub fn overlay(&self) -> &O {
        &self.overlay
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Start or restart the stream
    pub fn load_stream(&mut self) {
        if self.config.stream_url.is_empty() {
            warn!("No stream URL configured, not loading");
            return;
        }
        self.handle(PlayerEvent::LoadRequested);
    }

    /// Handle one event and everything it triggers synchronously
    pub fn handle(&mut self, event: PlayerEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let status = self.element.status();
            for effect in self.machine.step(event, status) {
                if let Some(follow_up) = self.apply(effect) {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    /// Load the stream, then handle events until `shutdown` resolves
    pub async fn run<Fut>(
        mut self,
        mut events: mpsc::UnboundedReceiver<PlayerEvent>,
        shutdown: Fut,
    ) -> Self
    where
        Fut: Future<Output = ()>,
    {
        self.load_stream();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                () = &mut shutdown => {
                    info!("Stopping playback controller");
                    break;
                }
            }
        }

        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        self
    }

    fn apply(&mut self, effect: Effect) -> Option<PlayerEvent> {
        match effect {
            Effect::DestroyEngine => {
                if let Some(mut engine) = self.engine.take() {
                    debug!("Destroying engine");
                    engine.destroy();
                }
            }
            Effect::CreateEngine => {
                let events = EngineEvents::new(self.machine.generation(), self.events.clone());
                match self.factory.create(&self.config.engine, events) {
                    Ok(engine) => self.engine = Some(engine),
                    Err(err) => {
                        error!("Player initialization error: {}", err);
                        return Some(PlayerEvent::EngineInitFailed);
                    }
                }
            }
            Effect::AttachMedia => {
                if let Some(engine) = self.engine.as_mut() {
                    if let Err(err) = engine.attach_media() {
                        error!("Player initialization error: {}", err);
                        return Some(PlayerEvent::EngineInitFailed);
                    }
                }
            }
            Effect::LoadSource => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.load_source(&self.config.stream_url);
                }
            }
            Effect::SetNativeSource => self.element.set_source(&self.config.stream_url),
            Effect::StartLoad => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.start_load();
                }
            }
            Effect::RecoverMediaError => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.recover_media_error();
                }
            }
            Effect::Play { muted } => {
                if muted {
                    self.element.set_muted(true);
                }
                if let Err(err) = self.element.play() {
                    error!("Play error (muted={}): {}", muted, err);
                    return Some(PlayerEvent::PlayRejected { muted });
                }
            }
            Effect::ShowLoading(show) => self.overlay.show_loading(show),
            Effect::ShowError(message) => self.overlay.show_error(message.as_deref()),
            Effect::Schedule { token, delay } => self.scheduler.schedule(token, delay),
        }
        None
    }
}

//! Playback resilience state machine
//!
//! [`PlaybackMachine::step`] is the single transition function: it takes an
//! event plus a snapshot of the video element and returns the side effects
//! to perform. It never touches an engine, an element or a timer itself, so
//! the retry and escalation policy can be tested without a media engine.
//!
//! Recovery is scoped to the narrowest fix that could resolve a symptom:
//!
//! | symptom                     | action                          |
//! |-----------------------------|---------------------------------|
//! | fatal network error         | resume loading after 1s         |
//! | fatal media error           | recover decode pipeline after 1s|
//! | element error               | full reload after 2s            |
//! | stall surviving 8s watchdog | full reload                     |

use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const NETWORK_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const MEDIA_RECOVERY_DELAY: Duration = Duration::from_secs(1);
pub const ELEMENT_RELOAD_DELAY: Duration = Duration::from_secs(2);
pub const STALL_WATCHDOG_DELAY: Duration = Duration::from_secs(8);

pub const MSG_NETWORK_ERROR: &str = "Network error occurred. Retrying...";
pub const MSG_MEDIA_ERROR: &str = "Media error occurred. Recovering...";
pub const MSG_FATAL_ERROR: &str = "Fatal error occurred. Please try again.";
pub const MSG_PLAY_BLOCKED: &str = "Playback blocked by browser. Please click to play.";
pub const MSG_ELEMENT_ERROR: &str = "Video playback error. Retrying...";
pub const MSG_INIT_FAILED: &str = "Failed to initialize player. Please try again.";
pub const MSG_UNSUPPORTED: &str = "Your browser does not support HLS playback.";

/// Logical playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Buffering,
    Recovering,
    /// Visible error overlay; recoverable by a timer or a user click
    Errored,
    /// No HLS capability at all; terminal
    Unsupported,
}

/// How the stream is attached to the element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Through an adaptive-bitrate media engine
    Engine,
    /// The element plays HLS by itself
    Native,
}

/// What the runtime can do, probed once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub engine_supported: bool,
    pub native_hls: bool,
}

/// Error class reported by the media engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Network,
    Media,
    Other,
}

/// Media element readiness, ordered like `HTMLMediaElement.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

/// Snapshot of the video element taken before each transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementStatus {
    pub paused: bool,
    pub ready_state: ReadyState,
}

impl Default for ElementStatus {
    fn default() -> Self {
        ElementStatus {
            paused: true,
            ready_state: ReadyState::HaveNothing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ResumeLoad,
    RecoverMedia,
    Reload,
    StallWatchdog,
}

/// A one-shot timer, stamped with the session generation that armed it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Events raised by a media engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine finished attaching to the element
    MediaAttached,
    ManifestLoading,
    ManifestParsed { levels: usize },
    LevelSwitched { level: usize },
    Error {
        kind: EngineErrorKind,
        fatal: bool,
        details: String,
    },
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Start (or restart) the stream
    LoadRequested,
    /// Reported by the engine created for session `generation`
    Engine { generation: u64, event: EngineEvent },
    /// Engine could not be constructed or attached
    EngineInitFailed,
    /// A play attempt was refused, usually by autoplay policy
    PlayRejected { muted: bool },
    LoadedMetadata,
    ElementError,
    Stalled,
    Playing,
    Waiting,
    CanPlay,
    CanPlayThrough,
    SurfaceClicked,
    TimerFired(TimerToken),
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    DestroyEngine,
    CreateEngine,
    AttachMedia,
    LoadSource,
    SetNativeSource,
    StartLoad,
    RecoverMediaError,
    Play { muted: bool },
    ShowLoading(bool),
    ShowError(Option<String>),
    Schedule { token: TimerToken, delay: Duration },
}

/// The playback session's state machine
#[derive(Debug, Clone)]
pub struct PlaybackMachine {
    state: PlaybackState,
    mode: Option<PlaybackMode>,
    capabilities: Capabilities,
    generation: u64,
}

impl PlaybackMachine {
    pub fn new(capabilities: Capabilities) -> Self {
        PlaybackMachine {
            state: PlaybackState::Idle,
            mode: None,
            capabilities,
            generation: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn mode(&self) -> Option<PlaybackMode> {
        self.mode
    }

    /// Generation of the current session; bumped by every load
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply one event
    pub fn step(&mut self, event: PlayerEvent, element: ElementStatus) -> Vec<Effect> {
        if self.state == PlaybackState::Unsupported {
            debug!("Ignoring {:?}: HLS playback unsupported", event);
            return Vec::new();
        }

        match event {
            PlayerEvent::LoadRequested => self.load_stream(),

            PlayerEvent::Engine { generation, event } => {
                if generation != self.generation {
                    debug!(
                        "Ignoring {:?} from engine of generation {} (current {})",
                        event, generation, self.generation
                    );
                    return Vec::new();
                }
                self.engine_event(event, element)
            }

            PlayerEvent::EngineInitFailed => {
                error!("Player initialization error");
                self.state = PlaybackState::Errored;
                vec![show_error(MSG_INIT_FAILED)]
            }

            PlayerEvent::PlayRejected { muted: false } => {
                warn!("Play rejected, retrying muted");
                vec![Effect::Play { muted: true }]
            }

            PlayerEvent::PlayRejected { muted: true } => {
                error!("Muted play rejected");
                self.state = PlaybackState::Errored;
                vec![show_error(MSG_PLAY_BLOCKED)]
            }

            PlayerEvent::LoadedMetadata => {
                if self.mode == Some(PlaybackMode::Native) {
                    self.play_video(element)
                } else {
                    Vec::new()
                }
            }

            PlayerEvent::ElementError => {
                error!("Video element error");
                self.state = PlaybackState::Errored;
                vec![
                    show_error(MSG_ELEMENT_ERROR),
                    self.schedule(TimerKind::Reload, ELEMENT_RELOAD_DELAY),
                ]
            }

            PlayerEvent::Stalled => {
                warn!("Playback stalled");
                self.state = PlaybackState::Buffering;
                vec![
                    Effect::ShowLoading(true),
                    self.schedule(TimerKind::StallWatchdog, STALL_WATCHDOG_DELAY),
                ]
            }

            PlayerEvent::Playing => {
                info!("Playback started");
                self.state = PlaybackState::Playing;
                vec![Effect::ShowLoading(false), Effect::ShowError(None)]
            }

            PlayerEvent::Waiting => {
                debug!("Buffering...");
                self.state = PlaybackState::Buffering;
                vec![Effect::ShowLoading(true)]
            }

            PlayerEvent::CanPlay | PlayerEvent::CanPlayThrough => {
                vec![Effect::ShowLoading(false)]
            }

            PlayerEvent::SurfaceClicked => {
                if element.paused {
                    self.play_video(element)
                } else {
                    Vec::new()
                }
            }

            PlayerEvent::TimerFired(token) => self.timer_fired(token, element),
        }
    }

    /// Tear down and rebuild the session
    fn load_stream(&mut self) -> Vec<Effect> {
        self.generation += 1;

        let mut effects = vec![
            Effect::ShowError(None),
            Effect::ShowLoading(true),
            Effect::DestroyEngine,
        ];

        if self.capabilities.engine_supported {
            self.mode = Some(PlaybackMode::Engine);
            self.state = PlaybackState::Loading;
            // The source is loaded once MediaAttached arrives
            effects.push(Effect::CreateEngine);
            effects.push(Effect::AttachMedia);
        } else if self.capabilities.native_hls {
            self.mode = Some(PlaybackMode::Native);
            self.state = PlaybackState::Loading;
            effects.push(Effect::SetNativeSource);
        } else {
            error!("No HLS playback capability");
            self.mode = None;
            self.state = PlaybackState::Unsupported;
            effects.push(Effect::ShowLoading(false));
            effects.push(show_error(MSG_UNSUPPORTED));
        }

        effects
    }

    fn engine_event(&mut self, event: EngineEvent, element: ElementStatus) -> Vec<Effect> {
        match event {
            EngineEvent::MediaAttached => {
                if self.mode == Some(PlaybackMode::Engine) {
                    info!("Media attached, loading source...");
                    vec![Effect::LoadSource]
                } else {
                    Vec::new()
                }
            }

            EngineEvent::ManifestLoading => {
                info!("Manifest loading...");
                self.state = PlaybackState::Loading;
                vec![Effect::ShowLoading(true), Effect::ShowError(None)]
            }

            EngineEvent::ManifestParsed { levels } => {
                info!("Manifest parsed, found {} quality levels", levels);
                let mut effects = vec![Effect::ShowLoading(false)];
                effects.extend(self.play_video(element));
                effects
            }

            EngineEvent::LevelSwitched { level } => {
                info!("Quality level switched to {}", level);
                Vec::new()
            }

            EngineEvent::Error {
                kind,
                fatal,
                details,
            } => self.engine_error(kind, fatal, &details),
        }
    }

    fn play_video(&mut self, element: ElementStatus) -> Vec<Effect> {
        if element.paused {
            vec![Effect::Play { muted: false }]
        } else {
            Vec::new()
        }
    }

    fn engine_error(&mut self, kind: EngineErrorKind, fatal: bool, details: &str) -> Vec<Effect> {
        if !fatal {
            warn!("Non-fatal error: {}", details);
            return Vec::new();
        }

        match kind {
            EngineErrorKind::Network => {
                error!("Network error: {}", details);
                self.state = PlaybackState::Recovering;
                vec![
                    show_error(MSG_NETWORK_ERROR),
                    self.schedule(TimerKind::ResumeLoad, NETWORK_RETRY_DELAY),
                ]
            }
            EngineErrorKind::Media => {
                error!("Media error: {}", details);
                self.state = PlaybackState::Recovering;
                vec![
                    show_error(MSG_MEDIA_ERROR),
                    self.schedule(TimerKind::RecoverMedia, MEDIA_RECOVERY_DELAY),
                ]
            }
            EngineErrorKind::Other => {
                error!("Fatal error: {}", details);
                self.state = PlaybackState::Errored;
                vec![show_error(MSG_FATAL_ERROR)]
            }
        }
    }

    fn timer_fired(&mut self, token: TimerToken, element: ElementStatus) -> Vec<Effect> {
        if token.generation != self.generation {
            debug!(
                "Ignoring stale {:?} timer from generation {} (current {})",
                token.kind, token.generation, self.generation
            );
            return Vec::new();
        }

        match token.kind {
            TimerKind::ResumeLoad => vec![Effect::StartLoad],
            TimerKind::RecoverMedia => vec![Effect::RecoverMediaError],
            TimerKind::Reload => self.load_stream(),
            TimerKind::StallWatchdog => {
                if element.ready_state < ReadyState::HaveFutureData {
                    info!("Still stalled after timeout, reloading stream");
                    self.load_stream()
                } else {
                    debug!("Stall resolved before watchdog fired");
                    Vec::new()
                }
            }
        }
    }

    fn schedule(&self, kind: TimerKind, delay: Duration) -> Effect {
        Effect::Schedule {
            token: TimerToken {
                kind,
                generation: self.generation,
            },
            delay,
        }
    }
}

fn show_error(message: &str) -> Effect {
    Effect::ShowError(Some(message.to_string()))
}

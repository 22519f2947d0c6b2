//! Playback resilience controller
//!
//! Keeps a live stream playing on a client: autoplay fallback, recovery
//! scoped to the failing layer, a stall watchdog and full reloads as the
//! last resort.

pub mod controller;
pub mod engine;
pub mod state;

pub use controller::{PlaybackController, PlayerConfig, TokioScheduler};
pub use engine::{
    EngineConfig, EngineEvents, EngineFactory, EventSink, MediaEngine, Overlay, PlayerError,
    Scheduler, VideoElement,
};
pub use state::{
    Capabilities, EngineErrorKind, EngineEvent, Effect, ElementStatus, PlaybackMachine,
    PlaybackMode, PlaybackState, PlayerEvent, ReadyState, TimerKind, TimerToken,
};

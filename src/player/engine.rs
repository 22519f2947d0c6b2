//! Capabilities the playback controller drives
//!
//! The controller never talks to a concrete media stack. It owns an engine
//! built by an [`EngineFactory`], a [`VideoElement`] and an [`Overlay`],
//! and reacts to the events they deliver through an [`EventSink`]. Each
//! engine reports through its own [`EngineEvents`], stamped with the
//! session it was created for.

use super::state::{ElementStatus, EngineEvent, PlayerEvent, TimerToken};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel the engine, the element and the timers report events into
pub type EventSink = mpsc::UnboundedSender<PlayerEvent>;

/// Sink handed to one engine; events outliving its session are dropped
#[derive(Debug, Clone)]
pub struct EngineEvents {
    generation: u64,
    events: EventSink,
}

impl EngineEvents {
    pub fn new(generation: u64, events: EventSink) -> Self {
        EngineEvents { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the controller has stopped
    pub fn send(&self, event: EngineEvent) -> bool {
        self.events
            .send(PlayerEvent::Engine {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Errors raised by player capabilities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    #[error("Play request rejected: {0}")]
    PlayRejected(String),
}

/// Tuning handed to every engine the controller creates
///
/// Field names serialize to the keys adaptive HLS engines expect, so the
/// player page can pass the relay's tuning straight through.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub debug: bool,
    pub enable_worker: bool,
    pub low_latency_mode: bool,
    /// Seconds of played media kept behind the playhead
    pub back_buffer_length: u32,
    /// Target forward buffer, seconds
    pub max_buffer_length: u32,
    pub max_max_buffer_length: u32,
    /// Forward buffer cap, bytes
    pub max_buffer_size: u64,
    pub manifest_loading_time_out: u64,
    pub manifest_loading_max_retry: u32,
    pub manifest_loading_retry_delay: u64,
    pub level_loading_time_out: u64,
    pub level_loading_max_retry: u32,
    pub level_loading_retry_delay: u64,
    pub frag_loading_time_out: u64,
    pub frag_loading_max_retry: u32,
    pub frag_loading_retry_delay: u64,
    /// -1 lets the engine pick
    pub start_level: i32,
    /// Initial bandwidth guess, bits per second
    pub abr_ewma_default_estimate: u64,
    pub abr_band_width_factor: f64,
    pub abr_band_width_up_factor: f64,
    pub abr_max_with_real_bitrate: bool,
    pub test_bandwidth: bool,
    pub progressive: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            debug: false,
            enable_worker: true,
            low_latency_mode: false,
            back_buffer_length: 90,
            max_buffer_length: 60,
            max_max_buffer_length: 600,
            max_buffer_size: 60 * 1000 * 1000,
            manifest_loading_time_out: 20_000,
            manifest_loading_max_retry: 6,
            manifest_loading_retry_delay: 500,
            level_loading_time_out: 20_000,
            level_loading_max_retry: 6,
            level_loading_retry_delay: 500,
            frag_loading_time_out: 20_000,
            frag_loading_max_retry: 6,
            frag_loading_retry_delay: 500,
            start_level: -1,
            abr_ewma_default_estimate: 500_000,
            abr_band_width_factor: 0.95,
            abr_band_width_up_factor: 0.7,
            abr_max_with_real_bitrate: true,
            test_bandwidth: true,
            progressive: true,
        }
    }
}

impl EngineConfig {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// An adaptive-bitrate HLS engine bound to one playback session
pub trait MediaEngine {
    fn attach_media(&mut self) -> Result<(), PlayerError>;
    fn load_source(&mut self, url: &str);
    /// Resume loading after a network failure
    fn start_load(&mut self);
    /// Rebuild the decode pipeline after a media failure
    fn recover_media_error(&mut self);
    fn destroy(&mut self);
}

/// Builds engines; one per playback session
pub trait EngineFactory {
    type Engine: MediaEngine;

    fn is_supported(&self) -> bool;

    /// Create an engine reporting into `events`
    fn create(&mut self, config: &EngineConfig, events: EngineEvents)
        -> Result<Self::Engine, PlayerError>;
}

/// The video surface
pub trait VideoElement {
    fn status(&self) -> ElementStatus;
    fn can_play_native_hls(&self) -> bool;
    fn set_source(&mut self, url: &str);
    fn set_muted(&mut self, muted: bool);
    fn play(&mut self) -> Result<(), PlayerError>;
}

/// Loading spinner and error banner
pub trait Overlay {
    fn show_loading(&mut self, show: bool);
    /// `None` hides the banner
    fn show_error(&mut self, message: Option<&str>);
}

/// One-shot timers that come back as `PlayerEvent::TimerFired`
pub trait Scheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration);
}

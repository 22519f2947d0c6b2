//! Playback controller driven by fake engine, element and overlay

use hls_relay::player::state::{MSG_INIT_FAILED, MSG_NETWORK_ERROR, MSG_PLAY_BLOCKED};
use hls_relay::player::{
    EngineConfig, EngineErrorKind, EngineEvent, EngineEvents, EngineFactory, ElementStatus,
    MediaEngine, Overlay, PlaybackController, PlaybackState, PlayerConfig, PlayerError,
    PlayerEvent, ReadyState, Scheduler, TimerToken, TokioScheduler, VideoElement,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

type CallLog = Arc<Mutex<Vec<String>>>;

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn count(log: &CallLog, call: &str) -> usize {
    log.lock().unwrap().iter().filter(|c| c.as_str() == call).count()
}

struct FakeEngine {
    id: usize,
    log: CallLog,
    live: Arc<Mutex<usize>>,
    events: EngineEvents,
    /// Report MediaAttached through the sink, as a real engine would
    announce_attach: bool,
}

impl MediaEngine for FakeEngine {
    fn attach_media(&mut self) -> Result<(), PlayerError> {
        self.log.lock().unwrap().push(format!("attach#{}", self.id));
        if self.announce_attach {
            self.events.send(EngineEvent::MediaAttached);
        }
        Ok(())
    }

    fn load_source(&mut self, url: &str) {
        self.log.lock().unwrap().push(format!("load_source#{} {}", self.id, url));
    }

    fn start_load(&mut self) {
        self.log.lock().unwrap().push("start_load".to_string());
    }

    fn recover_media_error(&mut self) {
        self.log.lock().unwrap().push("recover_media_error".to_string());
    }

    fn destroy(&mut self) {
        self.log.lock().unwrap().push(format!("destroy#{}", self.id));
        *self.live.lock().unwrap() -= 1;
    }
}

struct FakeFactory {
    supported: bool,
    fail: bool,
    announce_attach: bool,
    created: usize,
    log: CallLog,
    live: Arc<Mutex<usize>>,
}

impl FakeFactory {
    fn new(log: &CallLog) -> Self {
        FakeFactory {
            supported: true,
            fail: false,
            announce_attach: false,
            created: 0,
            log: Arc::clone(log),
            live: Arc::new(Mutex::new(0)),
        }
    }
}

impl EngineFactory for FakeFactory {
    type Engine = FakeEngine;

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&mut self, config: &EngineConfig, events: EngineEvents) -> Result<FakeEngine, PlayerError> {
        assert_eq!(config.max_buffer_length, 60);
        if self.fail {
            return Err(PlayerError::EngineInit("no media source extensions".to_string()));
        }
        self.created += 1;
        *self.live.lock().unwrap() += 1;
        Ok(FakeEngine {
            id: self.created,
            log: Arc::clone(&self.log),
            live: Arc::clone(&self.live),
            events,
            announce_attach: self.announce_attach,
        })
    }
}

#[derive(Default)]
struct FakeElement {
    status: ElementStatus,
    native_hls: bool,
    /// Reject unmuted plays (autoplay policy)
    block_unmuted: bool,
    /// Reject every play
    block_all: bool,
    muted: bool,
    source: Option<String>,
    plays: Vec<bool>,
}

impl VideoElement for FakeElement {
    fn status(&self) -> ElementStatus {
        self.status
    }

    fn can_play_native_hls(&self) -> bool {
        self.native_hls
    }

    fn set_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.plays.push(self.muted);
        if self.block_all || (self.block_unmuted && !self.muted) {
            return Err(PlayerError::PlayRejected("NotAllowedError".to_string()));
        }
        self.status.paused = false;
        Ok(())
    }
}

#[derive(Default)]
struct FakeOverlay {
    loading: bool,
    error: Option<String>,
}

impl Overlay for FakeOverlay {
    fn show_loading(&mut self, show: bool) {
        self.loading = show;
    }

    fn show_error(&mut self, message: Option<&str>) {
        self.error = message.map(str::to_string);
    }
}

#[derive(Default)]
struct RecordingScheduler {
    scheduled: Vec<(TimerToken, Duration)>,
}

impl Scheduler for RecordingScheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        self.scheduled.push((token, delay));
    }
}

const STREAM: &str = "/stream/CH2/tracks-v1a1/mono.m3u8";

type TestController = PlaybackController<FakeFactory, FakeElement, FakeOverlay, RecordingScheduler>;

fn controller(factory: FakeFactory, element: FakeElement) -> TestController {
    let (tx, _rx) = mpsc::unbounded_channel();
    PlaybackController::new(
        PlayerConfig::new(STREAM),
        factory,
        element,
        FakeOverlay::default(),
        RecordingScheduler::default(),
        tx,
    )
}

/// An engine event from the controller's current session
fn current<S: Scheduler>(
    player: &PlaybackController<FakeFactory, FakeElement, FakeOverlay, S>,
    event: EngineEvent,
) -> PlayerEvent {
    PlayerEvent::Engine {
        generation: player.machine().generation(),
        event,
    }
}

fn fatal(kind: EngineErrorKind) -> EngineEvent {
    EngineEvent::Error {
        kind,
        fatal: true,
        details: "test".to_string(),
    }
}

#[test]
fn test_load_attaches_then_loads_source() {
    let log = CallLog::default();
    let mut player = controller(FakeFactory::new(&log), FakeElement::default());

    player.load_stream();
    assert_eq!(calls(&log), vec!["attach#1".to_string()]);
    assert_eq!(player.state(), PlaybackState::Loading);
    assert!(player.overlay().loading);

    player.handle(current(&player, EngineEvent::MediaAttached));
    assert_eq!(
        calls(&log),
        vec!["attach#1".to_string(), format!("load_source#1 {}", STREAM)]
    );

    player.handle(current(&player, EngineEvent::ManifestParsed { levels: 2 }));
    assert_eq!(player.element().plays, vec![false]);
    assert!(!player.overlay().loading);

    player.handle(PlayerEvent::Playing);
    assert_eq!(player.state(), PlaybackState::Playing);
}

#[test]
fn test_double_reload_leaves_one_engine() {
    let log = CallLog::default();
    let factory = FakeFactory::new(&log);
    let live = Arc::clone(&factory.live);
    let mut player = controller(factory, FakeElement::default());

    player.load_stream();
    player.load_stream();
    player.load_stream();

    assert_eq!(*live.lock().unwrap(), 1);
    assert_eq!(player.engine().map(|e| e.id), Some(3));
    assert_eq!(count(&log, "destroy#1"), 1);
    assert_eq!(count(&log, "destroy#2"), 1);
    assert_eq!(count(&log, "destroy#3"), 0);
}

#[test]
fn test_replaced_engine_cannot_drive_new_session() {
    let log = CallLog::default();
    let mut factory = FakeFactory::new(&log);
    factory.announce_attach = true;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut player = PlaybackController::new(
        PlayerConfig::new(STREAM),
        factory,
        FakeElement::default(),
        FakeOverlay::default(),
        RecordingScheduler::default(),
        tx,
    );

    // Engine #1 queues MediaAttached, then is replaced before it is handled
    player.load_stream();
    player.load_stream();
    while let Ok(event) = rx.try_recv() {
        player.handle(event);
    }

    assert_eq!(
        calls(&log),
        vec![
            "attach#1".to_string(),
            "destroy#1".to_string(),
            "attach#2".to_string(),
            format!("load_source#2 {}", STREAM),
        ]
    );
    assert_eq!(count(&log, &format!("load_source#2 {}", STREAM)), 1);
}

#[test]
fn test_stale_engine_error_schedules_nothing() {
    let log = CallLog::default();
    let mut player = controller(FakeFactory::new(&log), FakeElement::default());

    player.load_stream();
    let stale = current(&player, fatal(EngineErrorKind::Network));
    player.load_stream();
    player.handle(stale);

    assert!(player.scheduler().scheduled.is_empty());
    assert_eq!(player.state(), PlaybackState::Loading);
    assert_eq!(player.overlay().error, None);
}

#[test]
fn test_autoplay_falls_back_to_muted() {
    let log = CallLog::default();
    let element = FakeElement {
        block_unmuted: true,
        ..Default::default()
    };
    let mut player = controller(FakeFactory::new(&log), element);

    player.load_stream();
    player.handle(current(&player, EngineEvent::ManifestParsed { levels: 1 }));

    assert_eq!(player.element().plays, vec![false, true]);
    assert!(player.element().muted);
    assert_eq!(player.overlay().error, None);
}

#[test]
fn test_blocked_playback_waits_for_click() {
    let log = CallLog::default();
    let element = FakeElement {
        block_all: true,
        ..Default::default()
    };
    let mut player = controller(FakeFactory::new(&log), element);

    player.load_stream();
    player.handle(current(&player, EngineEvent::ManifestParsed { levels: 1 }));

    assert_eq!(player.state(), PlaybackState::Errored);
    assert_eq!(player.overlay().error.as_deref(), Some(MSG_PLAY_BLOCKED));

    player.element_mut().block_all = false;
    player.handle(PlayerEvent::SurfaceClicked);
    assert_eq!(player.element().plays.len(), 3);
    assert!(!player.element().status.paused);
}

#[test]
fn test_engine_init_failure_is_reported() {
    let log = CallLog::default();
    let mut factory = FakeFactory::new(&log);
    factory.fail = true;
    let mut player = controller(factory, FakeElement::default());

    player.load_stream();
    assert_eq!(player.state(), PlaybackState::Errored);
    assert_eq!(player.overlay().error.as_deref(), Some(MSG_INIT_FAILED));
    assert!(player.engine().is_none());
    assert!(calls(&log).is_empty());
}

#[test]
fn test_native_fallback_sets_source() {
    let log = CallLog::default();
    let mut factory = FakeFactory::new(&log);
    factory.supported = false;
    let element = FakeElement {
        native_hls: true,
        ..Default::default()
    };
    let mut player = controller(factory, element);

    player.load_stream();
    assert_eq!(player.element().source.as_deref(), Some(STREAM));
    assert!(player.engine().is_none());

    player.handle(PlayerEvent::LoadedMetadata);
    assert_eq!(player.element().plays, vec![false]);
}

#[test]
fn test_unsupported_runtime() {
    let log = CallLog::default();
    let mut factory = FakeFactory::new(&log);
    factory.supported = false;
    let mut player = controller(factory, FakeElement::default());

    player.load_stream();
    assert_eq!(player.state(), PlaybackState::Unsupported);
    assert!(!player.overlay().loading);
    assert!(player.overlay().error.is_some());
    assert!(player.scheduler().scheduled.is_empty());
}

#[test]
fn test_empty_stream_url_does_nothing() {
    let log = CallLog::default();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut player = PlaybackController::new(
        PlayerConfig::new(""),
        FakeFactory::new(&log),
        FakeElement::default(),
        FakeOverlay::default(),
        RecordingScheduler::default(),
        tx,
    );

    player.load_stream();
    assert_eq!(player.state(), PlaybackState::Idle);
    assert!(calls(&log).is_empty());
}

#[test]
fn test_stale_timer_after_reload_is_ignored() {
    let log = CallLog::default();
    let mut player = controller(FakeFactory::new(&log), FakeElement::default());

    player.load_stream();
    player.handle(current(&player, fatal(EngineErrorKind::Network)));
    let (token, _) = player.scheduler().scheduled[0];

    // The session is replaced before the retry fires
    player.load_stream();
    player.handle(PlayerEvent::TimerFired(token));

    assert_eq!(count(&log, "start_load"), 0);
}

#[test]
fn test_stall_watchdog_reload() {
    let log = CallLog::default();
    let mut player = controller(FakeFactory::new(&log), FakeElement::default());

    player.load_stream();
    player.handle(PlayerEvent::Stalled);
    let (token, delay) = player.scheduler().scheduled[0];
    assert_eq!(delay, Duration::from_secs(8));

    player.element_mut().status.ready_state = ReadyState::HaveCurrentData;
    player.handle(PlayerEvent::TimerFired(token));

    assert_eq!(player.engine().map(|e| e.id), Some(2));
    assert_eq!(count(&log, "destroy#1"), 1);
}

#[test]
fn test_stall_watchdog_skips_recovered_stream() {
    let log = CallLog::default();
    let mut player = controller(FakeFactory::new(&log), FakeElement::default());

    player.load_stream();
    player.handle(PlayerEvent::Stalled);
    let (token, _) = player.scheduler().scheduled[0];

    player.element_mut().status.ready_state = ReadyState::HaveEnoughData;
    player.handle(PlayerEvent::Playing);
    player.handle(PlayerEvent::TimerFired(token));

    assert_eq!(player.engine().map(|e| e.id), Some(1));
    assert_eq!(player.state(), PlaybackState::Playing);
}

#[test]
fn test_media_error_recovers_without_reload() {
    let log = CallLog::default();
    let mut player = controller(FakeFactory::new(&log), FakeElement::default());

    player.load_stream();
    player.handle(current(&player, fatal(EngineErrorKind::Media)));
    let (token, delay) = player.scheduler().scheduled[0];
    assert_eq!(delay, Duration::from_secs(1));

    player.handle(PlayerEvent::TimerFired(token));
    assert_eq!(count(&log, "recover_media_error"), 1);
    assert_eq!(player.engine().map(|e| e.id), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_two_network_errors_retry_independently() {
    let log = CallLog::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut player = PlaybackController::new(
        PlayerConfig::new(STREAM),
        FakeFactory::new(&log),
        FakeElement::default(),
        FakeOverlay::default(),
        TokioScheduler::new(tx.clone()),
        tx,
    );

    player.load_stream();
    player.handle(current(&player, EngineEvent::MediaAttached));

    let start = Instant::now();
    player.handle(current(&player, fatal(EngineErrorKind::Network)));
    assert_eq!(player.state(), PlaybackState::Recovering);
    assert_eq!(player.overlay().error.as_deref(), Some(MSG_NETWORK_ERROR));

    tokio::time::sleep(Duration::from_millis(500)).await;
    player.handle(current(&player, fatal(EngineErrorKind::Network)));

    let mut fired_at = Vec::new();
    for _ in 0..2 {
        let event = rx.recv().await.unwrap();
        fired_at.push(start.elapsed());
        player.handle(event);
    }

    assert_eq!(count(&log, "start_load"), 2);
    // Each retry fires 1s after its own error, not after the first one
    assert!(fired_at[0] >= Duration::from_millis(1000) && fired_at[0] < Duration::from_millis(1050));
    assert!(fired_at[1] >= Duration::from_millis(1500) && fired_at[1] < Duration::from_millis(1550));
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_handles_element_error() {
    let log = CallLog::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let player = PlaybackController::new(
        PlayerConfig::new(STREAM),
        FakeFactory::new(&log),
        FakeElement::default(),
        FakeOverlay::default(),
        TokioScheduler::new(tx.clone()),
        tx.clone(),
    );

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(player.run(rx, async move {
        let _ = stopped.await;
    }));

    tx.send(PlayerEvent::ElementError).unwrap();
    // Reload fires 2s later
    tokio::time::sleep(Duration::from_millis(2100)).await;
    stop.send(()).unwrap();

    let player = task.await.unwrap();
    assert_eq!(count(&log, "attach#1"), 1);
    assert_eq!(count(&log, "attach#2"), 1);
    assert_eq!(count(&log, "destroy#1"), 1);
    // The run loop destroys the last engine on exit
    assert_eq!(count(&log, "destroy#2"), 1);
    assert!(player.engine().is_none());
}

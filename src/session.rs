//! The core per-post state machine. One `SessionManager` thread owns the
//! single currently-active session (if any), the verdict cache, and the
//! submission of overlay commands. All timers (settle, capture cadence),
//! captures, and the result subscription run on their own threads and report
//! back through a single fan-in channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::VerdictCache;
use crate::capture::Frame;
use crate::classifier::ws::{self, PollOutcome};
use crate::config::Config;
use crate::error::{CaptureError, SubscriptionError};
use crate::model::{
    base_post_id, epoch_ms, make_frame_filename, ClassifierResult, OverlayCommand, OverlayState,
    ScreenRect, Verdict,
};
use crate::sensor::SensorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Arming,
    Capturing,
    Resolved,
}

struct ActiveSession {
    full_id: String,
    base_id: String,
    rect: ScreenRect,
    dpr: f64,
    generation: u64,
    phase: Phase,
    frame_counter: u32,
    capturing_active: Arc<AtomicBool>,
}

/// Messages accepted by the session manager loop. A closed variant type
/// rather than several independent callback shapes.
pub enum ManagerMsg {
    Sensor(SensorEvent),
    SettleElapsed { generation: u64 },
    CaptureTick { generation: u64 },
    CaptureResult { generation: u64, outcome: Result<Frame, CaptureError> },
    Verdict { generation: u64, outcome: VerdictOutcome },
    SetDetectionEnabled(bool),
    SaveDebugFrame,
}

pub enum VerdictOutcome {
    Result(ClassifierResult),
    Failed(SubscriptionError),
    Closed,
}

pub struct SessionManager {
    config: Config,
    current: Option<ActiveSession>,
    next_generation: u64,
    /// Generation of the currently active session, 0 meaning none. Shared
    /// with spawned timer/subscription threads so a stale thread notices
    /// teardown without needing an explicit cancel handle.
    generation_gate: Arc<AtomicU64>,
    cache: VerdictCache,
    overlay_tx: Sender<OverlayCommand>,
    msg_tx: Sender<ManagerMsg>,
    detection_enabled: bool,
    last_frame_jpeg: Option<Vec<u8>>,
}

/// Spawns the sensor intake, the bridging thread that feeds its events into
/// the manager, and the manager loop itself. Returns a sender the rest of
/// the app (control surface, hotkeys) uses to issue commands.
pub fn spawn(config: Config, overlay_tx: Sender<OverlayCommand>) -> Sender<ManagerMsg> {
    let (msg_tx, msg_rx) = mpsc::channel::<ManagerMsg>();
    let (sensor_tx, sensor_rx) = mpsc::channel::<SensorEvent>();

    {
        let port = config.sensor_port;
        std::thread::spawn(move || crate::sensor::run(port, sensor_tx));
    }

    {
        let bridge_tx = msg_tx.clone();
        std::thread::spawn(move || {
            for event in sensor_rx {
                if bridge_tx.send(ManagerMsg::Sensor(event)).is_err() {
                    break;
                }
            }
        });
    }

    let mut manager = SessionManager {
        cache: VerdictCache::new(Duration::from_millis(config.verdict_cache_ttl_ms)),
        detection_enabled: config.detection_enabled,
        config,
        current: None,
        next_generation: 0,
        generation_gate: Arc::new(AtomicU64::new(0)),
        overlay_tx,
        msg_tx: msg_tx.clone(),
        last_frame_jpeg: None,
    };

    std::thread::spawn(move || manager.run(msg_rx));

    msg_tx
}

impl SessionManager {
    fn run(&mut self, msg_rx: Receiver<ManagerMsg>) {
        for msg in msg_rx {
            self.handle(msg);
            self.cache.purge_expired();
        }
    }

    fn handle(&mut self, msg: ManagerMsg) {
        match msg {
            ManagerMsg::Sensor(SensorEvent::Location(loc)) => self.on_location(loc),
            ManagerMsg::Sensor(SensorEvent::Disconnected) => {
                info!("sensor disconnected; resetting to idle");
                self.teardown_current();
            }
            ManagerMsg::SettleElapsed { generation } => self.on_settle_elapsed(generation),
            ManagerMsg::CaptureTick { generation } => self.on_capture_tick(generation),
            ManagerMsg::CaptureResult { generation, outcome } => {
                self.on_capture_result(generation, outcome)
            }
            ManagerMsg::Verdict { generation, outcome } => self.on_verdict(generation, outcome),
            ManagerMsg::SetDetectionEnabled(enabled) => {
                self.detection_enabled = enabled;
                if !enabled {
                    self.teardown_current();
                }
            }
            ManagerMsg::SaveDebugFrame => self.save_debug_frame(),
        }
    }

    fn on_location(&mut self, loc: crate::model::LocationMessage) {
        debug!(
            "location from {}: windowScreenX={} windowScreenY={}",
            loc.site, loc.window_screen_x, loc.window_screen_y
        );

        let Some(post) = loc.post else {
            self.teardown_current();
            return;
        };

        if !self.detection_enabled {
            self.teardown_current();
            return;
        }

        let full_id = post.id.clone();
        let base_id = base_post_id(&full_id);
        let rect = ScreenRect::from(&post);
        let dpr = loc.dpr;

        if let Some(session) = &mut self.current {
            if session.base_id == base_id {
                // Same post re-observed (e.g. a small scroll adjustment):
                // update geometry in place without restarting the machine.
                session.rect = rect;
                session.dpr = dpr;
                if session.phase == Phase::Resolved {
                    if let Some(verdict) = self.cache.get(&session.full_id).cloned() {
                        self.send_show(&verdict, rect);
                    }
                }
                return;
            }
        }

        self.teardown_current();
        self.arm(full_id, base_id, rect, dpr);
    }

    fn arm(&mut self, full_id: String, base_id: String, rect: ScreenRect, dpr: f64) {
        if let Some(verdict) = self.cache.get(&full_id).cloned() {
            info!("re-entry within TTL for {base_id}; rendering cached verdict");
            self.next_generation += 1;
            let generation = self.next_generation;
            self.generation_gate.store(generation, Ordering::SeqCst);
            self.current = Some(ActiveSession {
                full_id,
                base_id,
                rect,
                dpr,
                generation,
                phase: Phase::Resolved,
                frame_counter: 0,
                capturing_active: Arc::new(AtomicBool::new(false)),
            });
            self.send_show(&verdict, rect);
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.generation_gate.store(generation, Ordering::SeqCst);

        info!("arming session for {base_id}");
        self.current = Some(ActiveSession {
            full_id: full_id.clone(),
            base_id: base_id.clone(),
            rect,
            dpr,
            generation,
            phase: Phase::Arming,
            frame_counter: 0,
            capturing_active: Arc::new(AtomicBool::new(false)),
        });

        self.send_show(&Verdict::analyzing(base_id.clone()), rect);

        self.spawn_subscription(base_id, generation);
        self.spawn_settle_timer(generation);
    }

    fn spawn_settle_timer(&self, generation: u64) {
        let tx = self.msg_tx.clone();
        let delay = Duration::from_millis(self.config.settle_delay_ms);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            let _ = tx.send(ManagerMsg::SettleElapsed { generation });
        });
    }

    fn spawn_subscription(&self, base_id: String, generation: u64) {
        let tx = self.msg_tx.clone();
        let gate = self.generation_gate.clone();
        let api_base_url = self.config.api_base_url.clone();
        std::thread::spawn(move || {
            let mut socket = match ws::connect(&api_base_url, &base_id) {
                Ok(s) => s,
                Err(e) => {
                    warn!("subscription open failed for {base_id}: {e}");
                    let _ = tx.send(ManagerMsg::Verdict {
                        generation,
                        outcome: VerdictOutcome::Failed(e),
                    });
                    return;
                }
            };

            loop {
                if gate.load(Ordering::SeqCst) != generation {
                    debug!("subscription for {base_id} torn down before a verdict arrived");
                    let _ = socket.close(None);
                    return;
                }
                match ws::poll_once(&mut socket) {
                    PollOutcome::Verdict(result) => {
                        let _ = tx.send(ManagerMsg::Verdict {
                            generation,
                            outcome: VerdictOutcome::Result(result),
                        });
                        return;
                    }
                    PollOutcome::Closed => {
                        let _ = tx.send(ManagerMsg::Verdict {
                            generation,
                            outcome: VerdictOutcome::Closed,
                        });
                        return;
                    }
                    PollOutcome::Malformed => {
                        warn!("malformed verdict payload for {base_id}; ignoring and continuing to poll");
                        // a malformed frame doesn't close the stream
                    }
                    PollOutcome::Pending => {}
                }
            }
        });
    }

    fn on_settle_elapsed(&mut self, generation: u64) {
        let Some(session) = &mut self.current else { return };
        if session.generation != generation || session.phase != Phase::Arming {
            return; // superseded by a newer post before settling finished
        }
        session.phase = Phase::Capturing;
        session.frame_counter = 0;
        session.capturing_active.store(true, Ordering::SeqCst);
        info!("settle elapsed for {}; capturing", session.base_id);

        self.spawn_capture_timer(generation);
        self.try_capture(generation);
    }

    fn spawn_capture_timer(&self, generation: u64) {
        let tx = self.msg_tx.clone();
        let gate = self.generation_gate.clone();
        let interval = Duration::from_millis(self.config.capture_interval_ms);
        std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            if gate.load(Ordering::SeqCst) != generation {
                return;
            }
            if tx.send(ManagerMsg::CaptureTick { generation }).is_err() {
                return;
            }
        });
    }

    fn on_capture_tick(&mut self, generation: u64) {
        self.try_capture(generation);
    }

    fn try_capture(&mut self, generation: u64) {
        let Some(session) = &self.current else { return };
        if session.generation != generation || session.phase != Phase::Capturing {
            return;
        }

        if let Some(verdict) = self.cache.get(&session.full_id).cloned() {
            self.resolve_from_cache(generation, verdict);
            return;
        }

        let (rect, dpr) = (session.rect, session.dpr);
        let tx = self.msg_tx.clone();
        std::thread::spawn(move || {
            let outcome = crate::capture::capture(rect, dpr);
            let _ = tx.send(ManagerMsg::CaptureResult { generation, outcome });
        });
    }

    fn on_capture_result(&mut self, generation: u64, outcome: Result<Frame, CaptureError>) {
        match outcome {
            Ok(frame) => {
                self.last_frame_jpeg = Some(frame.jpeg.clone());

                // Re-check identity: the capture ran on its own thread, so a
                // teardown or a new post may have landed while it was in
                // flight. A stale result must not leave a frame behind for a
                // post that is no longer active.
                let Some(session) = &mut self.current else { return };
                if session.generation != generation || session.phase != Phase::Capturing {
                    debug!("discarding in-flight frame for {}; no longer active", session.base_id);
                    return;
                }
                session.frame_counter += 1;
                let filename = make_frame_filename(&session.full_id, session.frame_counter, epoch_ms());
                let path: PathBuf = self.config.frames_dir.join(&filename);
                if let Err(e) = std::fs::write(&path, &frame.jpeg) {
                    warn!("failed to write frame {filename}: {e}");
                } else {
                    debug!("wrote frame {filename}");
                }
            }
            Err(e) => {
                let Some(session) = &self.current else { return };
                if session.generation != generation || session.phase != Phase::Capturing {
                    return;
                }
                warn!("capture failed for {}: {e}; retrying next tick", session.base_id);
            }
        }
    }

    fn resolve_from_cache(&mut self, generation: u64, verdict: Verdict) {
        let Some(session) = &mut self.current else { return };
        if session.generation != generation {
            return;
        }
        session.phase = Phase::Resolved;
        session.capturing_active.store(false, Ordering::SeqCst);
        let rect = session.rect;
        info!("cached verdict found for {}; resolving", session.base_id);
        self.send_show(&verdict, rect);
    }

    fn on_verdict(&mut self, generation: u64, outcome: VerdictOutcome) {
        let Some(session) = &self.current else { return };
        if session.generation != generation {
            return; // superseded; ignore stale subscription result
        }

        match outcome {
            VerdictOutcome::Result(result) => {
                let full_id = session.full_id.clone();
                let base_id = session.base_id.clone();
                let rect = session.rect;
                let verdict = Verdict::from_result(base_id.clone(), result);
                if base_post_id(&full_id) == base_id {
                    self.cache.insert(full_id, verdict.clone());
                }
                if let Some(session) = &mut self.current {
                    session.phase = Phase::Resolved;
                    session.capturing_active.store(false, Ordering::SeqCst);
                }
                info!("verdict received for {base_id}: {}", verdict.label.as_str());
                self.send_show(&verdict, rect);
            }
            VerdictOutcome::Failed(e) => {
                warn!("subscription failed for {}: {e}", session.base_id);
                // stays in its current phase; UI keeps showing Analyzing…
            }
            VerdictOutcome::Closed => {
                warn!(
                    "subscription closed without a message for {}; continuing to capture",
                    session.base_id
                );
            }
        }
    }

    fn teardown_current(&mut self) {
        if let Some(session) = self.current.take() {
            info!("tearing down session for {}", session.base_id);
            session.capturing_active.store(false, Ordering::SeqCst);
        }
        // Invalidate any in-flight timer/subscription threads tied to the
        // torn-down session; 0 never matches a real generation.
        self.generation_gate.store(0, Ordering::SeqCst);
        let _ = self.overlay_tx.send(OverlayCommand::Hide);
    }

    fn send_show(&self, verdict: &Verdict, rect: ScreenRect) {
        let state = OverlayState {
            visible: true,
            x: rect.x,
            y: rect.y,
            w: rect.w,
            h: rect.h,
            label: verdict.label,
            score: verdict.confidence,
            post_id: verdict.post_id.clone(),
            show_debug_box: false,
        };
        let _ = self.overlay_tx.send(OverlayCommand::Show(state));
    }

    fn save_debug_frame(&self) {
        let Some(bytes) = &self.last_frame_jpeg else {
            warn!("no capture buffer available to save");
            return;
        };
        let path = self
            .config
            .debug_dir
            .join(format!("debug_{}.jpg", epoch_ms()));
        if let Err(e) = std::fs::write(&path, bytes) {
            warn!("failed to write debug frame: {e}");
        } else {
            info!("saved debug frame to {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocationMessage, PostLocation};
    use std::sync::mpsc::TryRecvError;

    fn test_config() -> Config {
        let mut c = Config::default();
        c.frames_dir = std::env::temp_dir().join("post-lens-test-frames");
        c.debug_dir = std::env::temp_dir().join("post-lens-test-debug");
        let _ = std::fs::create_dir_all(&c.frames_dir);
        let _ = std::fs::create_dir_all(&c.debug_dir);
        c.settle_delay_ms = 50;
        c.capture_interval_ms = 50;
        c
    }

    fn location(post: Option<PostLocation>) -> LocationMessage {
        LocationMessage {
            site: "test".into(),
            dpr: 1.0,
            window_screen_x: 0,
            window_screen_y: 0,
            post,
        }
    }

    fn post(id: &str) -> PostLocation {
        PostLocation {
            id: id.to_string(),
            x: 10.0,
            y: 10.0,
            w: 100.0,
            h: 200.0,
            visibility: 1.0,
        }
    }

    #[test]
    fn arming_shows_analyzing_overlay_immediately() {
        let (overlay_tx, overlay_rx) = mpsc::channel();
        let mut manager = SessionManager {
            cache: VerdictCache::new(Duration::from_secs(5)),
            detection_enabled: true,
            config: test_config(),
            current: None,
            next_generation: 0,
            generation_gate: Arc::new(AtomicU64::new(0)),
            overlay_tx,
            msg_tx: mpsc::channel().0,
            last_frame_jpeg: None,
        };

        manager.on_location(location(Some(post("post_1_1000"))));

        match overlay_rx.try_recv() {
            Ok(OverlayCommand::Show(state)) => {
                assert!(state.visible);
                assert_eq!(state.label.as_str(), "Analyzing…");
            }
            other => panic!("expected Show(Analyzing), got {other:?}"),
        }
    }

    #[test]
    fn clearing_post_hides_overlay() {
        let (overlay_tx, overlay_rx) = mpsc::channel();
        let mut manager = SessionManager {
            cache: VerdictCache::new(Duration::from_secs(5)),
            detection_enabled: true,
            config: test_config(),
            current: None,
            next_generation: 0,
            generation_gate: Arc::new(AtomicU64::new(0)),
            overlay_tx,
            msg_tx: mpsc::channel().0,
            last_frame_jpeg: None,
        };

        manager.on_location(location(Some(post("post_1_1000"))));
        let _ = overlay_rx.try_recv();
        manager.on_location(location(None));

        match overlay_rx.try_recv() {
            Ok(OverlayCommand::Hide) => {}
            other => panic!("expected Hide, got {other:?}"),
        }
        assert!(manager.current.is_none());
    }

    #[test]
    fn stale_settle_tick_is_ignored_after_new_post_arms() {
        let (overlay_tx, _overlay_rx) = mpsc::channel();
        let mut manager = SessionManager {
            cache: VerdictCache::new(Duration::from_secs(5)),
            detection_enabled: true,
            config: test_config(),
            current: None,
            next_generation: 0,
            generation_gate: Arc::new(AtomicU64::new(0)),
            overlay_tx,
            msg_tx: mpsc::channel().0,
            last_frame_jpeg: None,
        };

        manager.on_location(location(Some(post("post_1_1000"))));
        let first_generation = manager.current.as_ref().unwrap().generation;
        manager.on_location(location(Some(post("post_2_2000"))));

        // The first post's settle timer fires after the switch: must be a no-op.
        manager.on_settle_elapsed(first_generation);
        assert_eq!(manager.current.as_ref().unwrap().base_id, "post_2");
        assert_eq!(manager.current.as_ref().unwrap().phase, Phase::Arming);
    }

    #[test]
    fn detection_disabled_blocks_arming() {
        let (overlay_tx, overlay_rx) = mpsc::channel();
        let mut manager = SessionManager {
            cache: VerdictCache::new(Duration::from_secs(5)),
            detection_enabled: false,
            config: test_config(),
            current: None,
            next_generation: 0,
            generation_gate: Arc::new(AtomicU64::new(0)),
            overlay_tx,
            msg_tx: mpsc::channel().0,
            last_frame_jpeg: None,
        };

        manager.on_location(location(Some(post("post_1_1000"))));
        assert!(manager.current.is_none());
        assert!(matches!(overlay_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn reentry_within_ttl_resolves_immediately_without_new_capture_loop() {
        let (overlay_tx, overlay_rx) = mpsc::channel();
        let mut manager = SessionManager {
            cache: VerdictCache::new(Duration::from_secs(5)),
            detection_enabled: true,
            config: test_config(),
            current: None,
            next_generation: 0,
            generation_gate: Arc::new(AtomicU64::new(0)),
            overlay_tx,
            msg_tx: mpsc::channel().0,
            last_frame_jpeg: None,
        };

        manager.cache.insert(
            "post_3_3000",
            Verdict::from_result(
                "post_3",
                ClassifierResult {
                    is_ai: false,
                    confidence: 0.95,
                    severity: crate::model::Severity::Low,
                    reasons: vec![],
                },
            ),
        );

        manager.on_location(location(Some(post("post_3_3000"))));
        let session = manager.current.as_ref().unwrap();
        assert_eq!(session.phase, Phase::Resolved);

        match overlay_rx.try_recv() {
            Ok(OverlayCommand::Show(state)) => assert_eq!(state.label.as_str(), "Likely Real"),
            other => panic!("expected Show(Likely Real), got {other:?}"),
        }
    }
}

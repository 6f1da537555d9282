//=========================================================================
// Aetheric Ticker Engine
//
// Frame driver tying the event queue, scheduler and action manager
// together.
//
// Architecture:
// ```text
//     EngineBuilder  ──build()──>  Engine  ──draw_frame(delta)
//         │                          │        ├─ events.process_events_locked()
//         ├─ with_tps()              │        ├─ scheduler.tick(delta)
//         ├─ with_time_scale()       │        └─ actions.tick(delta * scale)
//         └─ with_event_*()          │
//                                    └─ spawn() ──> EngineThread (@ TPS)
// ```
//
//=========================================================================

//=== External Dependencies ===============================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{error, info, trace};
use thiserror::Error;

//=== Internal Dependencies ===============================================

use crate::core::action::ActionManager;
use crate::core::event::{EventDispatcher, DEFAULT_BACKLOG_WARNING};
use crate::core::scene::SceneGraph;
use crate::core::scheduler::Scheduler;

//=== EngineError =========================================================

/// Failures of the dedicated update thread.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn update thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("update thread panicked")]
    ThreadPanicked,

    #[error("update thread already running")]
    AlreadyRunning,
}

//=== TickControl =========================================================
//
// Control flow for the update thread loop.
//
pub(crate) enum TickControl {
    Continue,
    Exit,
}

//=== EngineBuilder =======================================================

/// Builder for configuring and constructing an [`Engine`].
///
/// # Default Values
///
/// - **TPS**: 60.0 (frames per second of the update thread)
/// - **Time scale**: 1.0
/// - **Event pool limit**: unbounded
/// - **Event backlog warning**: 256 events per drain
///
/// # Examples
///
/// ```no_run
/// use aetheric_ticker::EngineBuilder;
///
/// let engine = EngineBuilder::new()
///     .with_tps(120.0)
///     .with_time_scale(0.5)      // Slow motion
///     .with_event_pool_limit(64) // Keep at most 64 recycled events
///     .build();
///
/// engine.draw_frame(1.0 / 120.0);
/// ```
pub struct EngineBuilder {
    tps: f64,
    time_scale: f32,
    event_pool_limit: Option<usize>,
    event_backlog_warning: usize,
}

impl EngineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            tps: 60.0,
            time_scale: 1.0,
            event_pool_limit: None,
            event_backlog_warning: DEFAULT_BACKLOG_WARNING,
        }
    }

    /// Sets the target frames per second for [`Engine::spawn`].
    ///
    /// Default: 60.0
    ///
    /// # Panics
    ///
    /// Panics if `tps <= 0.0`.
    pub fn with_tps(mut self, tps: f64) -> Self {
        assert!(tps > 0.0, "TPS must be positive, got {}", tps);
        self.tps = tps;
        self
    }

    /// Sets the global speed factor applied to timers and actions.
    ///
    /// Default: 1.0
    ///
    /// # Panics
    ///
    /// Panics if `scale < 0.0`.
    pub fn with_time_scale(mut self, scale: f32) -> Self {
        assert!(scale >= 0.0, "Time scale must be non-negative, got {}", scale);
        self.time_scale = scale;
        self
    }

    /// Caps the number of recycled event records kept for reuse.
    ///
    /// Default: unbounded
    ///
    /// # Panics
    ///
    /// Panics if `limit == 0`.
    pub fn with_event_pool_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "Event pool limit must be positive");
        self.event_pool_limit = Some(limit);
        self
    }

    /// Sets the drained batch size above which a backlog warning is logged.
    ///
    /// Default: 256
    ///
    /// # Panics
    ///
    /// Panics if `threshold == 0`.
    pub fn with_event_backlog_warning(mut self, threshold: usize) -> Self {
        assert!(threshold > 0, "Event backlog threshold must be positive");
        self.event_backlog_warning = threshold;
        self
    }

    /// Builds the engine and its subsystems.
    pub fn build(self) -> Engine {
        info!(
            "Building engine (TPS: {}, time scale: {}, event pool limit: {:?})",
            self.tps, self.time_scale, self.event_pool_limit
        );

        let scheduler = Arc::new(Scheduler::new());
        scheduler.set_time_scale(self.time_scale);
        let events = Arc::new(
            EventDispatcher::new()
                .with_pool_limit(self.event_pool_limit)
                .with_backlog_warning(self.event_backlog_warning),
        );
        let scene = SceneGraph::new(scheduler.clone(), events.clone());
        let actions = scene.actions().clone();

        Engine {
            scheduler,
            actions,
            scene,
            events,
            paused: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            update_thread: AtomicBool::new(false),
            tps: self.tps,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//=== Engine ==============================================================

/// Per-frame update core.
///
/// Owns the subsystems as shared context objects and drives them in a
/// fixed order once per frame. Any thread may use the subsystem handles;
/// only one thread may call [`draw_frame`](Self::draw_frame).
pub struct Engine {
    scheduler: Arc<Scheduler>,
    actions: Arc<ActionManager>,
    scene: Arc<SceneGraph>,
    events: Arc<EventDispatcher>,
    paused: AtomicBool,
    frames: AtomicU64,
    update_thread: AtomicBool,
    tps: f64,
}

impl Engine {
    /// Engine with default configuration.
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    //--- Subsystems -------------------------------------------------------

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn actions(&self) -> &Arc<ActionManager> {
        &self.actions
    }

    pub fn scene(&self) -> &Arc<SceneGraph> {
        &self.scene
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    //--- Frame ------------------------------------------------------------

    /// Runs one frame: drains events, then ticks timers, then actions.
    ///
    /// While paused, events are still drained but timers and actions do
    /// not advance. Negative deltas are clamped to zero.
    pub fn draw_frame(&self, delta: f32) {
        let delta = delta.max(0.0);

        self.events.process_events_locked();

        if self.is_paused() {
            trace!("Frame skipped while paused");
            return;
        }

        self.scheduler.tick(delta);
        self.actions.tick(delta * self.scheduler.time_scale());
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Stops timers and actions from advancing. Returns false if already
    /// paused.
    pub fn pause(&self) -> bool {
        let changed = !self.paused.swap(true, Ordering::AcqRel);
        if changed {
            info!("Engine paused");
        }
        changed
    }

    /// Resumes timers and actions. Returns false if not paused.
    pub fn resume(&self) -> bool {
        let changed = self.paused.swap(false, Ordering::AcqRel);
        if changed {
            info!("Engine resumed");
        }
        changed
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Frames in which timers and actions advanced.
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn tps(&self) -> f64 {
        self.tps
    }

    //--- Update Thread ----------------------------------------------------

    /// Spawns a thread that calls [`draw_frame`](Self::draw_frame) at the
    /// configured TPS with measured deltas until the returned handle is
    /// stopped or dropped.
    ///
    /// At most one update thread runs per engine; a second call fails with
    /// [`EngineError::AlreadyRunning`] until the first handle is stopped.
    pub fn spawn(self: &Arc<Self>) -> Result<EngineThread, EngineError> {
        if self.update_thread.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let engine = Arc::clone(self);
        let frame_duration = Duration::from_secs_f64(1.0 / self.tps);

        let spawned = thread::Builder::new()
            .name("aetheric-update".into())
            .spawn(move || engine.run_update_loop(&shutdown_rx, frame_duration));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.update_thread.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        info!("Update thread spawned (TPS: {})", self.tps);
        Ok(EngineThread {
            engine: Arc::clone(self),
            handle: Some(handle),
            shutdown: shutdown_tx,
        })
    }

    /// Returns true while an update thread spawned by this engine is alive.
    pub fn has_update_thread(&self) -> bool {
        self.update_thread.load(Ordering::Acquire)
    }

    //--- run_update_loop() ------------------------------------------------
    //
    // Each frame:
    //  1. Measures the delta since the previous frame
    //  2. Runs draw_frame
    //  3. Waits out the rest of the frame on the shutdown channel
    //
    fn run_update_loop(&self, shutdown: &Receiver<()>, frame_duration: Duration) {
        let mut last = Instant::now();

        loop {
            let frame_start = Instant::now();
            let delta = frame_start.duration_since(last).as_secs_f32();
            last = frame_start;

            self.draw_frame(delta);

            let remaining = frame_duration.saturating_sub(frame_start.elapsed());
            if let TickControl::Exit = Self::wait_for_next_frame(shutdown, remaining) {
                break;
            }
        }

        self.events.discard_pending_locked();
        info!("Update thread exiting");
    }

    //--- wait_for_next_frame() --------------------------------------------
    //
    // Sleeps until the next frame is due, returning early with Exit when a
    // shutdown signal arrives or the handle is gone.
    //
    fn wait_for_next_frame(shutdown: &Receiver<()>, remaining: Duration) -> TickControl {
        match shutdown.recv_timeout(remaining) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => TickControl::Exit,
            Err(RecvTimeoutError::Timeout) => TickControl::Continue,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

//=== EngineThread ========================================================

/// Handle to the dedicated update thread. Dropping it stops the thread.
pub struct EngineThread {
    engine: Arc<Engine>,
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Sender<()>,
}

impl EngineThread {
    /// Signals the update thread to exit and waits for it.
    pub fn stop(mut self) -> Result<(), EngineError> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Result<(), EngineError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // A full channel already carries a shutdown signal.
        let _ = self.shutdown.try_send(());
        let joined = handle.join();
        self.engine.update_thread.store(false, Ordering::Release);
        joined.map_err(|_| EngineError::ThreadPanicked)?;
        info!("Update thread terminated cleanly");
        Ok(())
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_and_join() {
            error!("Update thread shutdown failed: {}", e);
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

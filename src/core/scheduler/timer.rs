//=========================================================================
// Timer
//=========================================================================
//
// A single periodic callback and the logic deciding when it is due.
//
// Firing modes:
//   EveryTick      → callback on every fire()
//   Interval(s)    → callback each time `s` seconds have accumulated
//                    (looping, so a long stall fires several times)
//   Frame(n)       → callback on every n-th fire()
//
// A Timer is a cheap-to-clone shared handle. The scheduler owns the
// scheduling of a timer; scene nodes only keep references so they can
// toggle it on enter/exit.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

//=== TimerMode ===========================================================

/// How a timer decides it is due.
///
/// A tagged variant: a timer is in exactly one mode, so switching to
/// interval firing always leaves frame firing and vice versa.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerMode {
    /// Fires on every scheduler tick.
    EveryTick,

    /// Fires each time the given number of seconds has accumulated.
    Interval(f32),

    /// Fires on every n-th scheduler tick.
    Frame(u32),
}

impl TimerMode {
    /// Interval mode, or `EveryTick` for a non-positive interval.
    pub fn interval(seconds: f32) -> Self {
        if seconds > 0.0 {
            Self::Interval(seconds)
        } else {
            Self::EveryTick
        }
    }

    /// Frame mode, or `EveryTick` for a zero period.
    pub fn frames(period: u32) -> Self {
        if period > 0 {
            Self::Frame(period)
        } else {
            Self::EveryTick
        }
    }

    fn same_kind(self, other: Self) -> bool {
        std::mem::discriminant(&self) == std::mem::discriminant(&other)
    }
}

//=== TimerState ==========================================================

#[derive(Debug)]
struct TimerState {
    mode: TimerMode,
    elapsed: f32,
    counter: u32,
    one_shot: bool,
    done: bool,
}

/// Outcome of advancing the accumulators for one fire().
struct Due {
    count: u32,
    delta: f32,
}

impl TimerState {
    fn advance(&mut self, delta: f32) -> Due {
        let mut due = match self.mode {
            TimerMode::EveryTick => Due { count: 1, delta },

            TimerMode::Frame(period) => {
                self.counter += 1;
                self.elapsed += delta;
                if self.counter >= period {
                    let since_last = self.elapsed;
                    self.counter = 0;
                    self.elapsed = 0.0;
                    Due { count: 1, delta: since_last }
                } else {
                    Due { count: 0, delta: 0.0 }
                }
            }

            TimerMode::Interval(interval) => {
                self.elapsed += delta;
                let mut count = 0;
                while self.elapsed >= interval {
                    self.elapsed -= interval;
                    count += 1;
                    if self.one_shot {
                        break;
                    }
                }
                Due { count, delta: interval }
            }
        };

        if self.one_shot && due.count > 0 {
            due.count = 1;
            self.done = true;
        }

        due
    }
}

//=== Timer ===============================================================

/// Callback invoked when a timer fires.
///
/// Receives the time covered by this firing: the interval for interval
/// timers, the accumulated delta since the last firing for frame timers,
/// and the tick delta for every-tick timers.
pub type TimerCallback = Box<dyn FnMut(f32) + Send>;

struct TimerInner {
    id: u64,
    state: Mutex<TimerState>,
    pending_remove: AtomicBool,
    callback: Mutex<TimerCallback>,
}

/// Shared handle to a periodic callback.
///
/// Equality is identity: two handles are equal only if they are clones
/// of the same timer.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

impl Timer {
    //--- Construction -----------------------------------------------------

    /// Creates a timer firing on every tick.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(f32) + Send + 'static,
    {
        Self::with_mode(TimerMode::EveryTick, callback)
    }

    /// Creates a timer firing every `seconds` of scaled time.
    pub fn with_interval<F>(seconds: f32, callback: F) -> Self
    where
        F: FnMut(f32) + Send + 'static,
    {
        Self::with_mode(TimerMode::interval(seconds), callback)
    }

    /// Creates a timer firing every `period` ticks.
    pub fn with_frame<F>(period: u32, callback: F) -> Self
    where
        F: FnMut(f32) + Send + 'static,
    {
        Self::with_mode(TimerMode::frames(period), callback)
    }

    /// Creates a timer in an explicit mode.
    pub fn with_mode<F>(mode: TimerMode, callback: F) -> Self
    where
        F: FnMut(f32) + Send + 'static,
    {
        Self {
            inner: Arc::new(TimerInner {
                id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(TimerState {
                    mode,
                    elapsed: 0.0,
                    counter: 0,
                    one_shot: false,
                    done: false,
                }),
                pending_remove: AtomicBool::new(false),
                callback: Mutex::new(Box::new(callback)),
            }),
        }
    }

    //--- Configuration ----------------------------------------------------

    /// Switches to interval firing.
    ///
    /// A non-positive interval means every tick. Leaving frame mode clears
    /// the frame counter and the accumulated time.
    pub fn set_interval(&self, seconds: f32) {
        self.set_mode(TimerMode::interval(seconds));
    }

    /// Switches to frame-count firing.
    ///
    /// A zero period means every tick. Leaving interval mode clears the
    /// accumulated time.
    pub fn set_frame(&self, period: u32) {
        self.set_mode(TimerMode::frames(period));
    }

    /// Replaces the firing mode.
    pub fn set_mode(&self, mode: TimerMode) {
        let mut state = self.inner.state.lock();
        if !state.mode.same_kind(mode) {
            state.elapsed = 0.0;
            state.counter = 0;
        }
        state.mode = mode;
    }

    /// Makes the timer fire at most once before marking itself done.
    pub fn set_one_shot(&self, one_shot: bool) {
        self.inner.state.lock().one_shot = one_shot;
    }

    /// Clears accumulated time, frame counter and the done flag.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.elapsed = 0.0;
        state.counter = 0;
        state.done = false;
    }

    //--- Firing -----------------------------------------------------------

    /// Advances the timer by `delta` seconds and invokes the callback for
    /// every firing that became due.
    ///
    /// Returns the number of invocations. A done one-shot timer never fires.
    /// If the timer is unscheduled from inside its own callback, the
    /// remaining catch-up firings of this call are skipped.
    pub fn fire(&self, delta: f32) -> u32 {
        let due = {
            let mut state = self.inner.state.lock();
            if state.done {
                return 0;
            }
            state.advance(delta)
        };

        if due.count == 0 {
            return 0;
        }

        // Only the per-timer callback lock is held here.
        let mut callback = self.inner.callback.lock();
        let mut fired = 0;
        for _ in 0..due.count {
            if fired > 0 && self.is_pending_remove() {
                break;
            }
            (callback)(due.delta);
            fired += 1;
        }
        fired
    }

    //--- Queries ----------------------------------------------------------

    /// Process-unique timer id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current firing mode.
    pub fn mode(&self) -> TimerMode {
        self.inner.state.lock().mode
    }

    /// Interval in seconds, if in interval mode.
    pub fn interval(&self) -> Option<f32> {
        match self.mode() {
            TimerMode::Interval(seconds) => Some(seconds),
            _ => None,
        }
    }

    /// Frame period, if in frame mode.
    pub fn frame(&self) -> Option<u32> {
        match self.mode() {
            TimerMode::Frame(period) => Some(period),
            _ => None,
        }
    }

    /// Seconds accumulated since the last firing.
    pub fn elapsed(&self) -> f32 {
        self.inner.state.lock().elapsed
    }

    /// Ticks counted since the last firing (frame mode only).
    pub fn counter(&self) -> u32 {
        self.inner.state.lock().counter
    }

    /// Returns true if the timer fires at most once.
    pub fn is_one_shot(&self) -> bool {
        self.inner.state.lock().one_shot
    }

    /// Returns true once a one-shot timer has fired.
    pub fn is_done(&self) -> bool {
        self.inner.state.lock().done
    }

    /// Returns true while an unschedule request is waiting for the merge.
    pub fn is_pending_remove(&self) -> bool {
        self.inner.pending_remove.load(Ordering::Acquire)
    }

    pub(crate) fn set_pending_remove(&self, pending: bool) {
        self.inner.pending_remove.store(pending, Ordering::Release);
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Timer {}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Timer")
            .field("id", &self.inner.id)
            .field("mode", &state.mode)
            .field("elapsed", &state.elapsed)
            .field("counter", &state.counter)
            .field("one_shot", &state.one_shot)
            .field("done", &state.done)
            .finish()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

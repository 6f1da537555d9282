//=========================================================================
// Scheduler
//=========================================================================
//
// Owns the live timer list and the merge-then-fire tick loop.
//
// Tick:
//   1. lock → merge pending adds/removes → snapshot live list → unlock
//   2. fire every snapshot timer with delta * time_scale (no lock held)
//   3. lock → drop one-shot timers that are done → unlock
//
// A timer scheduled during tick N is merged at tick N+1. A timer
// unscheduled during tick N is skipped for the rest of tick N if it has
// not been visited yet, and is gone from tick N+1.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use super::Timer;
use crate::core::pending::{Membership, PendingSet};

//=== Scheduler ===========================================================

/// Thread-safe registry and driver of periodic timers.
///
/// `schedule_locked`/`unschedule_locked` may be called from any thread,
/// including from inside a timer callback. `tick` is called once per frame
/// by the single update thread.
pub struct Scheduler {
    timers: Mutex<PendingSet<Timer>>,
    firing: Mutex<Vec<Timer>>,
    time_scale: Mutex<f32>,
    ticks: AtomicU64,
}

impl Scheduler {
    /// Creates an empty scheduler running at normal speed.
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(PendingSet::new()),
            firing: Mutex::new(Vec::new()),
            time_scale: Mutex::new(1.0),
            ticks: AtomicU64::new(0),
        }
    }

    //--- Registration -----------------------------------------------------

    /// Requests that `timer` starts firing from the next tick.
    ///
    /// Idempotent: scheduling a live or pending timer twice leaves exactly
    /// one entry. Scheduling a live timer that is marked for removal cancels
    /// the removal. A done one-shot timer is re-armed.
    pub fn schedule_locked(&self, timer: &Timer) {
        if timer.is_done() {
            timer.reset();
        }

        let mut timers = self.timers.lock();
        if timers.request_add(timer.clone()) {
            timer.set_pending_remove(false);
            trace!("Timer {} scheduled", timer.id());
        }
    }

    /// Requests that `timer` stops firing.
    ///
    /// A timer still waiting to be merged is cancelled before it ever runs.
    /// A live timer is skipped for the rest of the current tick and removed
    /// at the next merge. Unscheduling an unknown timer is a no-op.
    pub fn unschedule_locked(&self, timer: &Timer) {
        let mut timers = self.timers.lock();
        let was_live = timers.membership(timer) == Membership::Live;

        if timers.request_remove(timer) {
            if was_live {
                timer.set_pending_remove(true);
            }
            trace!("Timer {} unscheduled", timer.id());
        }
    }

    /// Requests removal of every live and pending timer.
    pub fn unschedule_all_locked(&self) {
        let mut timers = self.timers.lock();
        let cancelled = timers.cancel_pending_adds();

        let live: Vec<Timer> = timers.live().to_vec();
        for timer in &live {
            if timers.request_remove(timer) {
                timer.set_pending_remove(true);
            }
        }

        trace!(
            "Unscheduling all timers ({} live, {} pending cancelled)",
            live.len(),
            cancelled
        );
    }

    //--- Time Scale -------------------------------------------------------

    /// Sets the global speed factor applied to every tick delta.
    ///
    /// Values above 1 fast-forward, values below 1 slow down, 0 freezes.
    /// Negative values are clamped to 0.
    pub fn set_time_scale(&self, scale: f32) {
        *self.time_scale.lock() = scale.max(0.0);
    }

    /// Current speed factor (default 1.0).
    pub fn time_scale(&self) -> f32 {
        *self.time_scale.lock()
    }

    //--- Update Loop ------------------------------------------------------

    /// Merges pending registrations and fires every live timer once.
    ///
    /// Must only be called from the update thread. No scheduler lock is held
    /// while callbacks run, so callbacks may schedule and unschedule freely.
    pub fn tick(&self, delta: f32) {
        let scaled = delta * self.time_scale();
        let mut firing = std::mem::take(&mut *self.firing.lock());

        //--- Step 1: Merge pending buckets and snapshot -------------------
        {
            let mut timers = self.timers.lock();
            let (added, removed) = timers.apply_with(|t| t.set_pending_remove(false));
            if added > 0 || removed > 0 {
                trace!("Scheduler merged +{} / -{} timers", added, removed);
            }
            timers.snapshot_into(&mut firing);
        }

        //--- Step 2: Fire outside the lock --------------------------------
        let mut any_done = false;
        for timer in &firing {
            if timer.is_pending_remove() {
                continue;
            }
            timer.fire(scaled);
            any_done |= timer.is_done();
        }

        //--- Step 3: Reap finished one-shots ------------------------------
        if any_done {
            let reaped = self.timers.lock().retain_live(|t| !t.is_done());
            trace!("Scheduler reaped {} one-shot timers", reaped);
        }

        firing.clear();
        *self.firing.lock() = firing;
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    //--- Queries ----------------------------------------------------------

    /// Returns true if `timer` is live or waiting to become live, and not
    /// marked for removal.
    pub fn is_scheduled(&self, timer: &Timer) -> bool {
        matches!(
            self.membership(timer),
            Membership::Live | Membership::PendingAdd
        )
    }

    /// Which bucket `timer` currently occupies.
    pub fn membership(&self, timer: &Timer) -> Membership {
        self.timers.lock().membership(timer)
    }

    /// Number of live timers.
    pub fn scheduled_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Number of timers waiting to be merged in.
    pub fn pending_add_count(&self) -> usize {
        self.timers.lock().pending_add_len()
    }

    /// Number of live timers marked for removal.
    pub fn pending_remove_count(&self) -> usize {
        self.timers.lock().pending_remove_len()
    }

    /// Number of ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

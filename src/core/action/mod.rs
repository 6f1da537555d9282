//=========================================================================
// Action System
//=========================================================================
//
// Time-driven behaviors bound to one target each.
//
// Architecture:
//   ActionManager
//     ├─ targets: HashMap<TargetId, { actions: Vec<ActionHandle>, paused }>
//     └─ physics: PendingSet<TargetId>
//
// Lifecycle of one action:
//   add_action_locked → start(target) → step(delta)* → is_done → stop
//                                                             ↓
//                                         removed from its target bucket
//
//=========================================================================

//=== Module Declarations =================================================

mod action_manager;
mod builtin;

//=== External Dependencies ===============================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use crate::core::target::TargetId;

//=== Public API ==========================================================

pub use action_manager::ActionManager;
pub use builtin::{CallFunc, Delay};

//=== Action Trait ========================================================

/// Behavior state machine consumed by the [`ActionManager`].
///
/// Only `step` and `is_done` are required. Concrete behaviors (movement,
/// easing, grid effects) live outside the update core; they reach their
/// target through whatever node handle they captured.
///
/// An action that fails internally should report itself done so that it
/// is reaped, rather than panic.
pub trait Action: Send {
    /// Called once before the first step.
    fn start(&mut self, _target: TargetId) {}

    /// Advances the behavior by `delta` seconds of scaled time.
    fn step(&mut self, delta: f32);

    /// Returns true once the behavior has finished.
    fn is_done(&self) -> bool;

    /// Called once when the action finishes or is removed after starting.
    ///
    /// May register follow-up actions with the manager.
    fn stop(&mut self) {}

    /// Completion in `0.0..=1.0`, for actions that can report it.
    fn progress(&self) -> f32 {
        if self.is_done() {
            1.0
        } else {
            0.0
        }
    }
}

//=== ActionHandle ========================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Mutable part of a handle.
///
/// While a hook runs, `action` is out of the cell and the lock is free, so
/// the hook may call back into the handle or the manager. Requests made in
/// that window are recorded and honored when the action is put back.
struct ActionBody {
    action: Option<Box<dyn Action>>,
    phase: Phase,
    done: bool,
    progress: f32,
    halt_requested: bool,
    restart_requested: bool,
}

struct ActionCell {
    id: u64,
    tag: Option<i32>,
    target: Mutex<Option<TargetId>>,
    body: Mutex<ActionBody>,
}

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a registered (or registrable) action.
///
/// Equality is identity. A handle is registered with at most one target
/// at a time.
#[derive(Clone)]
pub struct ActionHandle {
    cell: Arc<ActionCell>,
}

impl ActionHandle {
    //--- Construction -----------------------------------------------------

    /// Wraps an untagged action.
    pub fn new<A: Action + 'static>(action: A) -> Self {
        Self::build(None, Box::new(action))
    }

    /// Wraps an action with a lookup tag.
    pub fn tagged<A: Action + 'static>(tag: i32, action: A) -> Self {
        Self::build(Some(tag), Box::new(action))
    }

    fn build(tag: Option<i32>, action: Box<dyn Action>) -> Self {
        let done = action.is_done();
        let progress = action.progress();
        Self {
            cell: Arc::new(ActionCell {
                id: NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed),
                tag,
                target: Mutex::new(None),
                body: Mutex::new(ActionBody {
                    action: Some(action),
                    phase: Phase::Idle,
                    done,
                    progress,
                    halt_requested: false,
                    restart_requested: false,
                }),
            }),
        }
    }

    //--- Queries ----------------------------------------------------------

    /// Process-unique action id.
    pub fn id(&self) -> u64 {
        self.cell.id
    }

    /// Lookup tag, if any.
    pub fn tag(&self) -> Option<i32> {
        self.cell.tag
    }

    /// Target the action is currently registered with.
    pub fn target(&self) -> Option<TargetId> {
        *self.cell.target.lock()
    }

    /// Returns true while the action is registered with a target.
    pub fn is_registered(&self) -> bool {
        self.target().is_some()
    }

    /// Returns true once the wrapped behavior reports completion, as of
    /// its last start or step.
    pub fn is_done(&self) -> bool {
        self.cell.body.lock().done
    }

    /// Completion of the wrapped behavior as of its last start or step.
    pub fn progress(&self) -> f32 {
        self.cell.body.lock().progress
    }

    //--- Manager Hooks ----------------------------------------------------

    pub(crate) fn set_target(&self, target: Option<TargetId>) {
        *self.cell.target.lock() = target;
    }

    /// Starts the action unless it is already running. A stopped action
    /// is restarted. Called while the action's own hook is running, the
    /// restart is deferred to its next update.
    pub(crate) fn begin(&self, target: TargetId) {
        let mut action = {
            let mut body = self.cell.body.lock();
            let Some(action) = body.action.take() else {
                body.restart_requested = true;
                return;
            };
            if body.phase == Phase::Running {
                body.action = Some(action);
                return;
            }
            body.phase = Phase::Running;
            action
        };

        action.start(target);
        let halted = self.record(action.as_ref());
        if halted {
            action.stop();
        }
        self.put_back(action, halted);
    }

    /// Runs one update. Returns true if the action finished on its own; its
    /// stop hook has then already run.
    pub(crate) fn advance(&self, target: TargetId, delta: f32) -> bool {
        let (mut action, needs_start) = {
            let mut body = self.cell.body.lock();
            if body.phase == Phase::Stopped {
                return false;
            }
            let Some(action) = body.action.take() else {
                return false;
            };
            let needs_start = body.phase == Phase::Idle;
            body.phase = Phase::Running;
            (action, needs_start)
        };

        if needs_start {
            action.start(target);
        }
        action.step(delta);

        let halted = self.record(action.as_ref());
        let done = action.is_done();
        if done || halted {
            action.stop();
        }
        self.put_back(action, done || halted);
        // A halted action was already unregistered by whoever halted it.
        done && !halted
    }

    /// Runs the stop hook if the action is running. Called while the
    /// action's own hook is running, the stop is deferred until that hook
    /// returns.
    pub(crate) fn halt(&self) {
        let mut action = {
            let mut body = self.cell.body.lock();
            if body.phase != Phase::Running {
                body.phase = Phase::Stopped;
                return;
            }
            let Some(action) = body.action.take() else {
                body.halt_requested = true;
                return;
            };
            body.phase = Phase::Stopped;
            action
        };

        action.stop();
        self.put_back(action, true);
    }

    /// Caches the queryable state of an out-of-cell action and consumes a
    /// pending halt request.
    fn record(&self, action: &dyn Action) -> bool {
        let done = action.is_done();
        let progress = action.progress();
        let mut body = self.cell.body.lock();
        body.done = done;
        body.progress = progress;
        std::mem::take(&mut body.halt_requested)
    }

    fn put_back(&self, action: Box<dyn Action>, stopped: bool) {
        let mut body = self.cell.body.lock();
        body.action = Some(action);
        body.halt_requested = false;
        if std::mem::take(&mut body.restart_requested) {
            body.phase = Phase::Idle;
        } else if stopped {
            body.phase = Phase::Stopped;
        }
    }
}

impl PartialEq for ActionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for ActionHandle {}

impl fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandle")
            .field("id", &self.cell.id)
            .field("tag", &self.cell.tag)
            .field("target", &self.target())
            .finish()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

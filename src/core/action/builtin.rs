//=========================================================================
// Built-in Actions
//=========================================================================
//
// The two behaviors the update core ships itself: waiting and calling
// back. Everything visual lives with the node types that need it.
//
//=========================================================================

use super::Action;
use crate::core::target::TargetId;

//=== Delay ===============================================================

/// Finishes after `duration` seconds of unpaused, scaled time.
#[derive(Debug, Clone)]
pub struct Delay {
    duration: f32,
    elapsed: f32,
}

impl Delay {
    /// Negative durations are treated as zero.
    pub fn new(duration: f32) -> Self {
        Self {
            duration: duration.max(0.0),
            elapsed: 0.0,
        }
    }

    /// Total wait in seconds.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Seconds waited since the last start.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

impl Action for Delay {
    fn start(&mut self, _target: TargetId) {
        self.elapsed = 0.0;
    }

    fn step(&mut self, delta: f32) {
        self.elapsed += delta.max(0.0);
    }

    fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }

    fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }
}

//=== CallFunc ============================================================

/// Invokes a callback with its target on the first step, then finishes.
pub struct CallFunc {
    target: Option<TargetId>,
    callback: Option<Box<dyn FnOnce(TargetId) + Send>>,
}

impl CallFunc {
    /// Wraps `callback`, which receives the target the action runs on.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(TargetId) + Send + 'static,
    {
        Self {
            target: None,
            callback: Some(Box::new(callback)),
        }
    }
}

impl Action for CallFunc {
    fn start(&mut self, target: TargetId) {
        self.target = Some(target);
    }

    fn step(&mut self, _delta: f32) {
        if let (Some(target), Some(callback)) = (self.target, self.callback.take()) {
            callback(target);
        }
    }

    fn is_done(&self) -> bool {
        self.callback.is_none()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

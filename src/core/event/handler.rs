//=========================================================================
// Input Handlers
//=========================================================================
//
// Priority chains shared by all five input categories.
//
// A chain is copy-on-write: registration replaces the shared entry list,
// while a drain in progress keeps walking the snapshot it started with.
// Changes therefore take effect from the next drain.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::sync::Arc;

//=== Internal Dependencies ===============================================

use super::payload::{Acceleration, EventCategory, EventType, GestureEvent, KeyEvent, MotionEvent};
use crate::core::target::TargetId;

//=== HandlerResult =======================================================

/// Outcome reported by a handler for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// The handler consumed the event.
    Handled,
    /// The handler did not act on the event.
    Ignored,
}

impl HandlerResult {
    pub fn is_handled(self) -> bool {
        self == HandlerResult::Handled
    }
}

//=== InputHandler ========================================================

/// Receiver of dispatched input, usually implemented by a node.
///
/// Every method defaults to [`HandlerResult::Ignored`], so a handler only
/// overrides the categories it registers for.
pub trait InputHandler: Send + Sync {
    fn on_key(&self, _kind: EventType, _event: &KeyEvent) -> HandlerResult {
        HandlerResult::Ignored
    }

    fn on_touch(&self, _kind: EventType, _event: &MotionEvent) -> HandlerResult {
        HandlerResult::Ignored
    }

    fn on_accelerometer(&self, _accel: &Acceleration) -> HandlerResult {
        HandlerResult::Ignored
    }

    fn on_double_tap(&self, _kind: EventType, _event: &MotionEvent) -> HandlerResult {
        HandlerResult::Ignored
    }

    fn on_gesture(&self, _kind: EventType, _event: &GestureEvent) -> HandlerResult {
        HandlerResult::Ignored
    }

    /// Whether handling an event of `category` stops it from reaching
    /// lower-priority handlers.
    fn intercepts(&self, _category: EventCategory) -> bool {
        true
    }
}

//=== HandlerChain ========================================================

#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) owner: TargetId,
    pub(crate) priority: i32,
    seq: u64,
    pub(crate) handler: Arc<dyn InputHandler>,
}

/// Handlers of one category, highest priority first. Equal priorities keep
/// registration order.
#[derive(Clone, Default)]
pub(crate) struct HandlerChain {
    entries: Arc<Vec<HandlerEntry>>,
    next_seq: u64,
}

impl HandlerChain {
    /// Registers `handler` for `owner`. An owner already present keeps its
    /// place in registration order and takes the new priority and handler.
    ///
    /// Returns true if the owner was not registered before.
    pub(crate) fn add(&mut self, owner: TargetId, priority: i32, handler: Arc<dyn InputHandler>) -> bool {
        let entries = Arc::make_mut(&mut self.entries);
        let fresh = match entries.iter_mut().find(|e| e.owner == owner) {
            Some(entry) => {
                entry.priority = priority;
                entry.handler = handler;
                false
            }
            None => {
                entries.push(HandlerEntry {
                    owner,
                    priority,
                    seq: self.next_seq,
                    handler,
                });
                self.next_seq += 1;
                true
            }
        };
        Self::sort(entries);
        fresh
    }

    pub(crate) fn remove(&mut self, owner: TargetId) -> bool {
        if !self.contains(owner) {
            return false;
        }
        Arc::make_mut(&mut self.entries).retain(|e| e.owner != owner);
        true
    }

    pub(crate) fn set_priority(&mut self, owner: TargetId, priority: i32) -> bool {
        if !self.contains(owner) {
            return false;
        }
        let entries = Arc::make_mut(&mut self.entries);
        for entry in entries.iter_mut().filter(|e| e.owner == owner) {
            entry.priority = priority;
        }
        Self::sort(entries);
        true
    }

    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries = Arc::new(Vec::new());
        count
    }

    pub(crate) fn contains(&self, owner: TargetId) -> bool {
        self.entries.iter().any(|e| e.owner == owner)
    }

    pub(crate) fn priority_of(&self, owner: TargetId) -> Option<i32> {
        self.entries.iter().find(|e| e.owner == owner).map(|e| e.priority)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<HandlerEntry>> {
        Arc::clone(&self.entries)
    }

    fn sort(entries: &mut [HandlerEntry]) {
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    }
}

/// Walks `entries` in order, stopping at the first handler that handles
/// the event and intercepts `category`. Returns true if any handler
/// handled it.
pub(crate) fn walk<F>(entries: &[HandlerEntry], category: EventCategory, mut deliver: F) -> bool
where
    F: FnMut(&dyn InputHandler) -> HandlerResult,
{
    let mut handled = false;
    for entry in entries {
        let result = deliver(entry.handler.as_ref());
        if result.is_handled() {
            handled = true;
            if entry.handler.intercepts(category) {
                break;
            }
        }
    }
    handled
}

//=========================================================================
// Unit Tests
//=========================================================================

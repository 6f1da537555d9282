//=========================================================================
// Targets
//=========================================================================
//
// Opaque identity of the objects actions and timers are bound to.
//
// The update core never owns a target. It holds a generation-checked
// handle and asks the owning graph, at update time, whether the handle
// still refers to a live object.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;

//=== TargetId ============================================================

/// Weak, generation-checked reference to a scene node.
///
/// Two ids are equal only if both the arena slot and the generation match,
/// so an id that outlived its node never aliases the node that later
/// reuses the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId {
    index: u32,
    generation: u32,
}

impl TargetId {
    /// Builds an id from its raw parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Liveness generation of the slot when the id was issued.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({}v{})", self.index, self.generation)
    }
}

//=== TargetGraph =========================================================

/// Capabilities the update core consumes from the scene-node owner.
///
/// Implemented by [`crate::core::scene::SceneGraph`]; tests supply small
/// stand-ins.
pub trait TargetGraph: Send + Sync {
    /// Returns true while `target` refers to a live node.
    fn is_alive(&self, target: TargetId) -> bool;

    /// Direct children of `target`, in tree order. Dead targets have none.
    fn children(&self, target: TargetId) -> Vec<TargetId>;

    /// Advances velocity/acceleration driven motion of `target` by `delta`.
    fn integrate_motion(&self, _target: TargetId, _delta: f32) {}

    /// `target` followed by all of its descendants, depth first.
    fn subtree(&self, target: TargetId) -> Vec<TargetId> {
        let mut out = Vec::new();
        let mut stack = vec![target];
        while let Some(next) = stack.pop() {
            out.push(next);
            let children = self.children(next);
            stack.extend(children.into_iter().rev());
        }
        out
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

//=========================================================================
// Scene Graph
//=========================================================================
//
// Minimal node arena that owns targets on behalf of the update core.
//
// Nodes are addressed by generation-checked `TargetId`s. Destroying a
// node bumps its slot generation, so stale ids held by actions or timers
// stop resolving. Input handlers registered under a destroyed id are
// detached from the dispatcher.
//
// Lifecycle bridge:
//   attach to running parent ─► enter(subtree) ─► activate_timers
//   detach / exit / destroy   ─► exit(subtree)  ─► deactivate_timers
//
// No scheduler, action or user call is made while the node lock is held.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::ops::{Add, AddAssign, Mul};
use std::sync::{Arc, Weak};

use log::{debug, trace};
use parking_lot::RwLock;

//=== Internal Dependencies ===============================================

use crate::core::action::ActionManager;
use crate::core::event::EventDispatcher;
use crate::core::scheduler::{Scheduler, Timer};
use crate::core::target::{TargetGraph, TargetId};

//=== Vec2 ================================================================

/// Plain 2D vector for node motion.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

//=== Arena ===============================================================

#[derive(Default)]
struct Node {
    parent: Option<TargetId>,
    children: Vec<TargetId>,
    running: bool,
    timers: Vec<Timer>,
    position: Vec2,
    velocity: Vec2,
    acceleration: Vec2,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Arena {
    fn get(&self, id: TargetId) -> Option<&Node> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    fn get_mut(&mut self, id: TargetId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    fn insert(&mut self, node: Node) -> TargetId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                TargetId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                TargetId::new(index, 0)
            }
        }
    }

    fn release(&mut self, id: TargetId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        Some(node)
    }

    fn subtree(&self, root: TargetId) -> Vec<TargetId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.get(next) {
                out.push(next);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn is_ancestor(&self, candidate: TargetId, of: TargetId) -> bool {
        let mut cursor = self.get(of).and_then(|n| n.parent);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            cursor = self.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

//=== SceneGraph ==========================================================

/// Node tree that the scheduler and action manager resolve targets
/// against.
///
/// Built inside an `Arc` so the action manager can hold it weakly.
pub struct SceneGraph {
    arena: RwLock<Arena>,
    scheduler: Arc<Scheduler>,
    actions: Arc<ActionManager>,
    events: Arc<EventDispatcher>,
}

impl SceneGraph {
    //--- Construction -----------------------------------------------------

    /// Creates an empty graph wired to `scheduler`, to `events` and to a
    /// fresh action manager that resolves its targets here.
    pub fn new(scheduler: Arc<Scheduler>, events: Arc<EventDispatcher>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<SceneGraph>| {
            let graph: Weak<dyn TargetGraph> = weak.clone();
            Self {
                arena: RwLock::new(Arena::default()),
                scheduler,
                actions: Arc::new(ActionManager::new(graph)),
                events,
            }
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn actions(&self) -> &Arc<ActionManager> {
        &self.actions
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    //--- Node Lifecycle ---------------------------------------------------

    /// Creates a detached, non-running node.
    pub fn create_node(&self) -> TargetId {
        let id = self.arena.write().insert(Node::default());
        trace!("Created node {:?}", id);
        id
    }

    /// Destroys `node` and its whole subtree.
    ///
    /// Running nodes exit first. Their actions are removed (stop hooks
    /// run), their timers unscheduled, their input handlers detached and
    /// their physics registration dropped. Every destroyed id stops
    /// resolving.
    pub fn destroy_node(&self, node: TargetId) -> bool {
        if !self.is_alive(node) {
            return false;
        }

        self.detach(node);
        self.exit(node);
        self.actions.remove_actions_locked(node, true);

        let released: Vec<(TargetId, Node)> = {
            let mut arena = self.arena.write();
            arena
                .subtree(node)
                .into_iter()
                .filter_map(|id| arena.release(id).map(|n| (id, n)))
                .collect()
        };

        for (id, data) in &released {
            for timer in &data.timers {
                self.scheduler.unschedule_locked(timer);
            }
            self.actions.remove_physics_node(*id);
            self.events.remove_owner_handlers_locked(*id);
        }

        debug!("Destroyed {:?} ({} nodes)", node, released.len());
        true
    }

    /// Attaches `child` under `parent`. The child must be detached and must
    /// not be an ancestor of `parent`. A child attached to a running parent
    /// enters immediately.
    pub fn add_child(&self, parent: TargetId, child: TargetId) -> bool {
        let parent_running = {
            let mut arena = self.arena.write();
            if parent == child || arena.is_ancestor(child, parent) {
                debug!("Rejected {:?} under {:?}: would form a cycle", child, parent);
                return false;
            }
            match arena.get(child) {
                Some(node) if node.parent.is_none() => {}
                _ => return false,
            }
            let Some(parent_node) = arena.get_mut(parent) else {
                return false;
            };
            parent_node.children.push(child);
            let running = parent_node.running;
            if let Some(child_node) = arena.get_mut(child) {
                child_node.parent = Some(parent);
            }
            running
        };

        if parent_running {
            self.enter(child);
        }
        true
    }

    /// Detaches `child` from its parent, exiting it if it was running.
    pub fn remove_child(&self, child: TargetId) -> bool {
        if !self.detach(child) {
            return false;
        }
        self.exit(child);
        true
    }

    fn detach(&self, child: TargetId) -> bool {
        let mut arena = self.arena.write();
        let Some(parent) = arena.get(child).and_then(|n| n.parent) else {
            return false;
        };
        if let Some(parent_node) = arena.get_mut(parent) {
            parent_node.children.retain(|c| *c != child);
        }
        if let Some(node) = arena.get_mut(child) {
            node.parent = None;
        }
        true
    }

    /// Marks `root` and its subtree running and activates their timers.
    /// Nodes already running are left alone.
    pub fn enter(&self, root: TargetId) -> usize {
        let entered = self.set_running(root, true);
        for id in &entered {
            self.activate_timers(*id);
        }
        entered.len()
    }

    /// Marks `root` and its subtree stopped and deactivates their timers.
    pub fn exit(&self, root: TargetId) -> usize {
        let exited = self.set_running(root, false);
        for id in &exited {
            self.deactivate_timers(*id);
        }
        exited.len()
    }

    fn set_running(&self, root: TargetId, running: bool) -> Vec<TargetId> {
        let mut arena = self.arena.write();
        let mut changed = arena.subtree(root);
        changed.retain(|id| arena.get(*id).is_some_and(|n| n.running != running));
        for id in &changed {
            if let Some(node) = arena.get_mut(*id) {
                node.running = running;
            }
        }
        changed
    }

    //--- Timers -----------------------------------------------------------

    /// Attaches `timer` to `node`. It is scheduled now if the node is
    /// running, otherwise on the node's next enter.
    pub fn schedule_locked(&self, node: TargetId, timer: &Timer) -> bool {
        let running = {
            let mut arena = self.arena.write();
            let Some(data) = arena.get_mut(node) else {
                return false;
            };
            if !data.timers.contains(timer) {
                data.timers.push(timer.clone());
            }
            data.running
        };

        if running {
            self.scheduler.schedule_locked(timer);
        }
        true
    }

    /// Detaches `timer` from `node` and unschedules it.
    pub fn unschedule_locked(&self, node: TargetId, timer: &Timer) -> bool {
        let removed = {
            let mut arena = self.arena.write();
            let Some(data) = arena.get_mut(node) else {
                return false;
            };
            let before = data.timers.len();
            data.timers.retain(|t| t != timer);
            before != data.timers.len()
        };

        if removed {
            self.scheduler.unschedule_locked(timer);
        }
        removed
    }

    /// Schedules every timer attached to `node`.
    pub fn activate_timers(&self, node: TargetId) {
        for timer in self.timers_of(node) {
            self.scheduler.schedule_locked(&timer);
        }
    }

    /// Unschedules every timer attached to `node`. The node keeps them.
    pub fn deactivate_timers(&self, node: TargetId) {
        for timer in self.timers_of(node) {
            self.scheduler.unschedule_locked(&timer);
        }
    }

    fn timers_of(&self, node: TargetId) -> Vec<Timer> {
        self.arena
            .read()
            .get(node)
            .map(|n| n.timers.clone())
            .unwrap_or_default()
    }

    //--- Motion -----------------------------------------------------------

    pub fn set_position(&self, node: TargetId, position: Vec2) -> bool {
        match self.arena.write().get_mut(node) {
            Some(data) => {
                data.position = position;
                true
            }
            None => false,
        }
    }

    /// Sets the velocity of `node`, in units per second.
    pub fn set_velocity(&self, node: TargetId, velocity: Vec2) -> bool {
        self.update_motion(node, |data| data.velocity = velocity)
    }

    /// Sets the acceleration of `node`, in units per second squared.
    pub fn set_acceleration(&self, node: TargetId, acceleration: Vec2) -> bool {
        self.update_motion(node, |data| data.acceleration = acceleration)
    }

    fn update_motion<F: FnOnce(&mut Node)>(&self, node: TargetId, apply: F) -> bool {
        let moving = {
            let mut arena = self.arena.write();
            let Some(data) = arena.get_mut(node) else {
                return false;
            };
            apply(data);
            !(data.velocity.is_zero() && data.acceleration.is_zero())
        };

        if moving {
            self.actions.add_physics_node(node);
        } else {
            self.actions.remove_physics_node(node);
        }
        true
    }

    pub fn position(&self, node: TargetId) -> Option<Vec2> {
        self.arena.read().get(node).map(|n| n.position)
    }

    pub fn velocity(&self, node: TargetId) -> Option<Vec2> {
        self.arena.read().get(node).map(|n| n.velocity)
    }

    //--- Queries ----------------------------------------------------------

    pub fn parent(&self, node: TargetId) -> Option<TargetId> {
        self.arena.read().get(node)?.parent
    }

    pub fn is_running(&self, node: TargetId) -> bool {
        self.arena.read().get(node).is_some_and(|n| n.running)
    }

    pub fn timer_count(&self, node: TargetId) -> usize {
        self.arena.read().get(node).map_or(0, |n| n.timers.len())
    }

    pub fn node_count(&self) -> usize {
        self.arena.read().live_count()
    }
}

impl TargetGraph for SceneGraph {
    fn is_alive(&self, target: TargetId) -> bool {
        self.arena.read().get(target).is_some()
    }

    fn children(&self, target: TargetId) -> Vec<TargetId> {
        self.arena
            .read()
            .get(target)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn integrate_motion(&self, target: TargetId, delta: f32) {
        if let Some(node) = self.arena.write().get_mut(target) {
            node.velocity += node.acceleration * delta;
            node.position += node.velocity * delta;
        }
    }

    fn subtree(&self, target: TargetId) -> Vec<TargetId> {
        self.arena.read().subtree(target)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

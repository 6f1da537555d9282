//=========================================================================
// Action Manager
//=========================================================================
//
// Per-target action buckets plus the physics node set.
//
// Structural changes (add, remove, pause) may come from any thread. The
// per-frame tick runs on the update thread and works on a snapshot, so
// buckets are never mutated while being iterated. Empty buckets created
// or emptied during a tick are swept at its end.
//
// Lock order: table → handle target. Action hooks always run with no
// manager or handle lock held, so they may add or remove actions,
// including their own.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Weak};

use log::{debug, trace};
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use super::ActionHandle;
use crate::core::pending::PendingSet;
use crate::core::target::{TargetGraph, TargetId};

//=== Internal State ======================================================

#[derive(Default)]
struct TargetEntry {
    actions: Vec<ActionHandle>,
    paused: bool,
}

#[derive(Default)]
struct ActionTable {
    targets: HashMap<TargetId, TargetEntry>,
    removing_all: bool,
}

impl ActionTable {
    /// Unregisters `action` from `target`. The bucket is left in place,
    /// possibly empty.
    fn detach(&mut self, target: TargetId, action: &ActionHandle) -> bool {
        let Some(entry) = self.targets.get_mut(&target) else {
            return false;
        };
        match entry.actions.iter().position(|a| a == action) {
            Some(pos) => {
                entry.actions.remove(pos);
                action.set_target(None);
                true
            }
            None => false,
        }
    }

    fn drop_if_empty(&mut self, target: TargetId) {
        if self
            .targets
            .get(&target)
            .is_some_and(|entry| entry.actions.is_empty())
        {
            self.targets.remove(&target);
        }
    }

    /// Removes a whole bucket, unregistering its actions.
    fn take_bucket(&mut self, target: TargetId, out: &mut Vec<ActionHandle>) {
        if let Some(entry) = self.targets.remove(&target) {
            for action in entry.actions {
                action.set_target(None);
                out.push(action);
            }
        }
    }
}

/// Reusable buffers owned by the update thread between ticks.
#[derive(Default)]
struct TickScratch {
    batch: Vec<(TargetId, ActionHandle)>,
    targets: Vec<TargetId>,
}

/// Stand-in graph type for a manager with no owner attached.
struct Unattached;

impl TargetGraph for Unattached {
    fn is_alive(&self, _target: TargetId) -> bool {
        true
    }

    fn children(&self, _target: TargetId) -> Vec<TargetId> {
        Vec::new()
    }
}

//=== ActionManager =======================================================

/// Registry of running actions keyed by target.
///
/// Each `(action, target)` pair is registered at most once. A target has a
/// bucket only while it has actions. Targets are held weakly; a bucket
/// whose target died is dropped on the next tick without stepping it.
pub struct ActionManager {
    graph: Weak<dyn TargetGraph>,
    table: Mutex<ActionTable>,
    physics: Mutex<PendingSet<TargetId>>,
    scratch: Mutex<TickScratch>,
}

impl ActionManager {
    //--- Construction -----------------------------------------------------

    /// Creates a manager that resolves liveness and hierarchy through
    /// `graph`.
    pub fn new(graph: Weak<dyn TargetGraph>) -> Self {
        Self {
            graph,
            table: Mutex::new(ActionTable::default()),
            physics: Mutex::new(PendingSet::new()),
            scratch: Mutex::new(TickScratch::default()),
        }
    }

    /// Creates a manager with no graph: every target counts as alive and
    /// childless.
    pub fn detached() -> Self {
        Self::new(Weak::<Unattached>::new())
    }

    fn graph(&self) -> Option<Arc<dyn TargetGraph>> {
        self.graph.upgrade()
    }

    fn scope(&self, target: TargetId, include_children: bool) -> Vec<TargetId> {
        match self.graph() {
            Some(graph) if include_children => graph.subtree(target),
            _ => vec![target],
        }
    }

    //--- Registration -----------------------------------------------------

    /// Registers `action` with `target` and starts it.
    ///
    /// Returns false if the action is already registered (with this or any
    /// other target) or a remove-all is in progress.
    pub fn add_action_locked(&self, action: &ActionHandle, target: TargetId) -> bool {
        {
            let mut table = self.table.lock();
            if table.removing_all {
                debug!("Ignored add of action {} during remove-all", action.id());
                return false;
            }
            if let Some(current) = action.target() {
                if current != target {
                    debug!(
                        "Action {} is already bound to {:?}; add to {:?} ignored",
                        action.id(),
                        current,
                        target
                    );
                }
                return false;
            }

            let entry = table.targets.entry(target).or_insert_with(|| {
                trace!("Created action bucket for {:?}", target);
                TargetEntry::default()
            });
            entry.actions.push(action.clone());
            action.set_target(Some(target));
        }

        action.begin(target);
        true
    }

    /// Unregisters `action` from whichever target holds it and runs its
    /// stop hook.
    pub fn remove_action_locked(&self, action: &ActionHandle) -> bool {
        {
            let mut table = self.table.lock();
            if table.removing_all {
                debug!("Ignored removal of action {} during remove-all", action.id());
                return false;
            }
            let Some(target) = action.target() else {
                return false;
            };
            if !table.detach(target, action) {
                return false;
            }
            table.drop_if_empty(target);
        }

        action.halt();
        true
    }

    /// Removes the first action on `target` carrying `tag`.
    pub fn remove_action_by_tag_locked(&self, target: TargetId, tag: i32) -> bool {
        let removed = {
            let mut table = self.table.lock();
            if table.removing_all {
                debug!("Ignored removal of tag {} during remove-all", tag);
                return false;
            }
            let found = table
                .targets
                .get(&target)
                .and_then(|entry| entry.actions.iter().find(|a| a.tag() == Some(tag)))
                .cloned();
            match found {
                Some(action) => {
                    table.detach(target, &action);
                    table.drop_if_empty(target);
                    action
                }
                None => {
                    trace!("No action tagged {} on {:?}", tag, target);
                    return false;
                }
            }
        };

        removed.halt();
        true
    }

    /// Removes every action on `target`, and on all its descendants when
    /// `include_children` is set. Returns the number removed.
    pub fn remove_actions_locked(&self, target: TargetId, include_children: bool) -> usize {
        let scope = self.scope(target, include_children);

        let mut removed = Vec::new();
        {
            let mut table = self.table.lock();
            if table.removing_all {
                debug!("Ignored removal for {:?} during remove-all", target);
                return 0;
            }
            for t in scope {
                table.take_bucket(t, &mut removed);
            }
        }

        for action in &removed {
            action.halt();
        }
        removed.len()
    }

    /// Removes every action from every target.
    ///
    /// Stop hooks run with the removing-all flag set, so any add or remove
    /// they attempt is ignored.
    pub fn remove_all_actions_locked(&self) -> usize {
        let mut removed = Vec::new();
        {
            let mut table = self.table.lock();
            if table.removing_all {
                return 0;
            }
            table.removing_all = true;
            let targets: Vec<TargetId> = table.targets.keys().copied().collect();
            for t in targets {
                table.take_bucket(t, &mut removed);
            }
        }

        for action in &removed {
            action.halt();
        }

        self.table.lock().removing_all = false;
        debug!("Removed all {} actions", removed.len());
        removed.len()
    }

    //--- Pause / Resume ---------------------------------------------------

    /// Stops stepping the actions of `target` (and descendants) without
    /// touching their state. Targets with no actions are unaffected.
    pub fn pause_actions(&self, target: TargetId, include_children: bool) {
        self.set_paused(target, include_children, true);
    }

    /// Resumes stepping the actions of `target` (and descendants).
    pub fn resume_actions(&self, target: TargetId, include_children: bool) {
        self.set_paused(target, include_children, false);
    }

    fn set_paused(&self, target: TargetId, include_children: bool, paused: bool) {
        let scope = self.scope(target, include_children);
        let mut table = self.table.lock();
        for t in scope {
            if let Some(entry) = table.targets.get_mut(&t) {
                entry.paused = paused;
            }
        }
    }

    /// Returns true if `target` has a paused bucket.
    pub fn is_paused(&self, target: TargetId) -> bool {
        self.table
            .lock()
            .targets
            .get(&target)
            .is_some_and(|entry| entry.paused)
    }

    //--- Queries ----------------------------------------------------------

    /// Number of actions registered with `target`.
    pub fn running_action_count(&self, target: TargetId) -> usize {
        self.table
            .lock()
            .targets
            .get(&target)
            .map_or(0, |entry| entry.actions.len())
    }

    /// First action on `target` carrying `tag`.
    pub fn get_action(&self, target: TargetId, tag: i32) -> Option<ActionHandle> {
        self.table
            .lock()
            .targets
            .get(&target)?
            .actions
            .iter()
            .find(|a| a.tag() == Some(tag))
            .cloned()
    }

    /// Returns true if `target` currently owns a bucket.
    pub fn has_target(&self, target: TargetId) -> bool {
        self.table.lock().targets.contains_key(&target)
    }

    /// Number of targets with a bucket.
    pub fn target_count(&self) -> usize {
        self.table.lock().targets.len()
    }

    /// Returns true while a remove-all is running its stop hooks.
    pub fn is_removing_all(&self) -> bool {
        self.table.lock().removing_all
    }

    //--- Physics Nodes ----------------------------------------------------

    /// Requests that `target` be integrated every tick. Takes effect at the
    /// start of the next tick.
    pub fn add_physics_node(&self, target: TargetId) -> bool {
        self.physics.lock().request_add(target)
    }

    /// Requests that `target` stop being integrated.
    pub fn remove_physics_node(&self, target: TargetId) -> bool {
        self.physics.lock().request_remove(&target)
    }

    /// Returns true if `target` is integrated or about to be.
    pub fn is_physics_node(&self, target: TargetId) -> bool {
        use crate::core::pending::Membership;
        matches!(
            self.physics.lock().membership(&target),
            Membership::Live | Membership::PendingAdd
        )
    }

    /// Number of physics nodes currently integrated.
    pub fn physics_node_count(&self) -> usize {
        self.physics.lock().len()
    }

    //--- Tick -------------------------------------------------------------

    /// Steps every running action and integrates physics nodes by `delta`
    /// seconds. Call from the update thread only.
    pub fn tick(&self, delta: f32) {
        let mut scratch = mem::take(&mut *self.scratch.lock());
        let graph = self.graph();

        self.drop_dead_targets(graph.as_deref(), &mut scratch.targets);

        {
            let table = self.table.lock();
            for (target, entry) in table.targets.iter() {
                if entry.paused {
                    continue;
                }
                scratch
                    .batch
                    .extend(entry.actions.iter().map(|a| (*target, a.clone())));
            }
        }

        for (target, action) in scratch.batch.drain(..) {
            // Removed or re-bound by an earlier callback this tick.
            if action.target() != Some(target) {
                continue;
            }
            if action.advance(target, delta) {
                self.table.lock().detach(target, &action);
            }
        }

        {
            let mut table = self.table.lock();
            let before = table.targets.len();
            table.targets.retain(|_, entry| !entry.actions.is_empty());
            let swept = before - table.targets.len();
            if swept > 0 {
                trace!("Swept {} empty action buckets", swept);
            }
        }

        self.step_physics(graph.as_deref(), delta, &mut scratch.targets);

        *self.scratch.lock() = scratch;
    }

    fn drop_dead_targets(&self, graph: Option<&dyn TargetGraph>, keys: &mut Vec<TargetId>) {
        let Some(graph) = graph else {
            return;
        };

        keys.clear();
        keys.extend(self.table.lock().targets.keys().copied());
        keys.retain(|t| !graph.is_alive(*t));
        if keys.is_empty() {
            return;
        }

        let mut orphaned = Vec::new();
        {
            let mut table = self.table.lock();
            for t in keys.drain(..) {
                debug!("Dropping actions of dead target {:?}", t);
                table.take_bucket(t, &mut orphaned);
            }
        }
        // Stop hooks are skipped: their target no longer exists.
        drop(orphaned);
    }

    fn step_physics(&self, graph: Option<&dyn TargetGraph>, delta: f32, nodes: &mut Vec<TargetId>) {
        nodes.clear();
        {
            let mut physics = self.physics.lock();
            physics.apply();
            physics.snapshot_into(nodes);
        }

        let Some(graph) = graph else {
            return;
        };

        let mut dead = Vec::new();
        for node in nodes.drain(..) {
            if graph.is_alive(node) {
                graph.integrate_motion(node, delta);
            } else {
                dead.push(node);
            }
        }

        if !dead.is_empty() {
            let mut physics = self.physics.lock();
            for node in &dead {
                physics.request_remove(node);
            }
        }
    }
}

impl Default for ActionManager {
    fn default() -> Self {
        Self::detached()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{Action, CallFunc, Delay};
    use crossbeam_channel::bounded;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    //=====================================================================
    // Test Graph
    //=====================================================================

    #[derive(Default)]
    struct TestGraph {
        dead: Mutex<HashSet<TargetId>>,
        edges: Mutex<HashMap<TargetId, Vec<TargetId>>>,
        integrated: Mutex<Vec<(TargetId, f32)>>,
    }

    impl TargetGraph for TestGraph {
        fn is_alive(&self, target: TargetId) -> bool {
            !self.dead.lock().contains(&target)
        }

        fn children(&self, target: TargetId) -> Vec<TargetId> {
            self.edges.lock().get(&target).cloned().unwrap_or_default()
        }

        fn integrate_motion(&self, target: TargetId, delta: f32) {
            self.integrated.lock().push((target, delta));
        }
    }

    fn with_graph() -> (Arc<TestGraph>, ActionManager) {
        let graph = Arc::new(TestGraph::default());
        let weak: Weak<dyn TargetGraph> = Arc::downgrade(&graph) as Weak<dyn TargetGraph>;
        (graph, ActionManager::new(weak))
    }

    fn id(index: u32) -> TargetId {
        TargetId::new(index, 0)
    }

    struct CountingStop {
        stops: Arc<AtomicU32>,
        done: bool,
    }

    impl Action for CountingStop {
        fn step(&mut self, _delta: f32) {}

        fn is_done(&self) -> bool {
            self.done
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Runs one tick on a worker and fails instead of hanging if it never
    /// returns.
    fn tick_within(manager: &Arc<ActionManager>, delta: f32) {
        let (done_tx, done_rx) = bounded(1);
        let m = manager.clone();
        thread::spawn(move || {
            m.tick(delta);
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(Duration::from_secs(2)).is_ok(),
            "tick did not return"
        );
    }

    type Slot = Arc<Mutex<Option<ActionHandle>>>;

    /// Counts its steps and never finishes. Optionally removes itself on
    /// its first step.
    struct Stepper {
        steps: Arc<AtomicU32>,
        stops: Arc<AtomicU32>,
        remove_self: Option<(Arc<ActionManager>, Slot)>,
    }

    impl Action for Stepper {
        fn step(&mut self, _delta: f32) {
            self.steps.fetch_add(1, Ordering::SeqCst);
            if let Some((manager, slot)) = &self.remove_self {
                if let Some(handle) = slot.lock().clone() {
                    manager.remove_action_locked(&handle);
                }
            }
        }

        fn is_done(&self) -> bool {
            false
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stepper(
        remove_self: Option<&Arc<ActionManager>>,
    ) -> (ActionHandle, Arc<AtomicU32>, Arc<AtomicU32>) {
        let steps = Arc::new(AtomicU32::new(0));
        let stops = Arc::new(AtomicU32::new(0));
        let slot: Slot = Arc::new(Mutex::new(None));
        let handle = ActionHandle::new(Stepper {
            steps: steps.clone(),
            stops: stops.clone(),
            remove_self: remove_self.map(|m| (m.clone(), slot.clone())),
        });
        *slot.lock() = Some(handle.clone());
        (handle, steps, stops)
    }

    fn counting() -> (ActionHandle, Arc<AtomicU32>) {
        let stops = Arc::new(AtomicU32::new(0));
        let handle = ActionHandle::new(CountingStop {
            stops: stops.clone(),
            done: false,
        });
        (handle, stops)
    }

    //=====================================================================
    // Registration
    //=====================================================================

    #[test]
    fn delays_finish_in_order_and_bucket_is_dropped() {
        let manager = ActionManager::detached();
        let node = id(1);
        let a = ActionHandle::new(Delay::new(1.0));
        let b = ActionHandle::new(Delay::new(2.0));

        assert!(manager.add_action_locked(&a, node));
        assert!(manager.add_action_locked(&b, node));
        assert_eq!(manager.running_action_count(node), 2);

        manager.tick(1.0);
        assert_eq!(manager.running_action_count(node), 1, "A finished");
        assert!(!a.is_registered());
        assert!((b.progress() - 0.5).abs() < 1e-6, "B half way");

        manager.tick(1.0);
        assert_eq!(manager.running_action_count(node), 0);
        assert!(!manager.has_target(node), "bucket deleted once empty");
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let manager = ActionManager::detached();
        let action = ActionHandle::new(Delay::new(1.0));

        assert!(manager.add_action_locked(&action, id(1)));
        assert!(!manager.add_action_locked(&action, id(1)));
        assert!(!manager.add_action_locked(&action, id(2)), "bound elsewhere");
        assert_eq!(manager.running_action_count(id(1)), 1);
        assert_eq!(manager.target_count(), 1);
    }

    #[test]
    fn remove_runs_stop_and_drops_empty_bucket() {
        let manager = ActionManager::detached();
        let (action, stops) = counting();

        manager.add_action_locked(&action, id(1));
        assert!(manager.remove_action_locked(&action));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!manager.has_target(id(1)));
        assert!(!manager.remove_action_locked(&action), "second remove is a no-op");
    }

    #[test]
    fn removed_action_is_not_stepped() {
        let manager = ActionManager::detached();
        let action = ActionHandle::new(Delay::new(1.0));

        manager.add_action_locked(&action, id(1));
        manager.remove_action_locked(&action);
        manager.tick(0.5);

        assert_eq!(action.progress(), 0.0);
    }

    #[test]
    fn remove_by_tag_takes_first_match_only() {
        let manager = ActionManager::detached();
        let first = ActionHandle::tagged(7, Delay::new(1.0));
        let second = ActionHandle::tagged(7, Delay::new(1.0));
        manager.add_action_locked(&first, id(1));
        manager.add_action_locked(&second, id(1));

        assert_eq!(manager.get_action(id(1), 7), Some(first.clone()));
        assert!(manager.remove_action_by_tag_locked(id(1), 7));
        assert_eq!(manager.get_action(id(1), 7), Some(second));
        assert!(!manager.remove_action_by_tag_locked(id(1), 99));
        assert!(!manager.remove_action_by_tag_locked(id(5), 7));
    }

    #[test]
    fn remove_actions_with_children_clears_subtree() {
        let (graph, manager) = with_graph();
        graph.edges.lock().insert(id(0), vec![id(1), id(2)]);

        for n in 0..4 {
            manager.add_action_locked(&ActionHandle::new(Delay::new(5.0)), id(n));
        }

        assert_eq!(manager.remove_actions_locked(id(0), false), 1);
        assert_eq!(manager.remove_actions_locked(id(0), true), 2);
        assert_eq!(manager.target_count(), 1, "unrelated node keeps its actions");
        assert!(manager.has_target(id(3)));
    }

    #[test]
    fn remove_all_suppresses_reentrant_changes() {
        let manager = Arc::new(ActionManager::detached());
        let follow_up = ActionHandle::new(Delay::new(1.0));

        struct AddOnStop {
            manager: Arc<ActionManager>,
            follow_up: ActionHandle,
            added: Arc<AtomicU32>,
        }

        impl Action for AddOnStop {
            fn step(&mut self, _delta: f32) {}
            fn is_done(&self) -> bool {
                false
            }
            fn stop(&mut self) {
                if self.manager.add_action_locked(&self.follow_up, TargetId::new(9, 0)) {
                    self.added.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let added = Arc::new(AtomicU32::new(0));
        let action = ActionHandle::new(AddOnStop {
            manager: manager.clone(),
            follow_up: follow_up.clone(),
            added: added.clone(),
        });
        manager.add_action_locked(&action, id(1));
        manager.add_action_locked(&ActionHandle::new(Delay::new(1.0)), id(2));

        assert_eq!(manager.remove_all_actions_locked(), 2);
        assert_eq!(added.load(Ordering::SeqCst), 0, "add suppressed during remove-all");
        assert_eq!(manager.target_count(), 0);
        assert!(!manager.is_removing_all());

        assert!(manager.add_action_locked(&follow_up, id(9)), "adds work again afterwards");
    }

    //=====================================================================
    // Tick
    //=====================================================================

    #[test]
    fn finished_action_stops_before_it_is_unregistered() {
        let manager = Arc::new(ActionManager::detached());
        let seen_registered = Arc::new(AtomicU32::new(0));

        struct Observe {
            seen: Arc<AtomicU32>,
            self_handle: Arc<Mutex<Option<ActionHandle>>>,
            done: bool,
        }

        impl Action for Observe {
            fn step(&mut self, _delta: f32) {
                self.done = true;
            }
            fn is_done(&self) -> bool {
                self.done
            }
            fn stop(&mut self) {
                if let Some(handle) = self.self_handle.lock().as_ref() {
                    if handle.target().is_some() && handle.is_done() {
                        self.seen.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }

        let slot = Arc::new(Mutex::new(None));
        let action = ActionHandle::new(Observe {
            seen: seen_registered.clone(),
            self_handle: slot.clone(),
            done: false,
        });
        *slot.lock() = Some(action.clone());

        manager.add_action_locked(&action, id(1));
        manager.tick(0.1);

        assert_eq!(seen_registered.load(Ordering::SeqCst), 1);
        assert!(!action.is_registered());
        assert_eq!(manager.running_action_count(id(1)), 0);
    }

    #[test]
    fn pause_preserves_action_state() {
        let manager = ActionManager::detached();
        let action = ActionHandle::new(Delay::new(2.0));
        manager.add_action_locked(&action, id(1));

        manager.tick(0.5);
        manager.pause_actions(id(1), false);
        assert!(manager.is_paused(id(1)));
        for _ in 0..3 {
            manager.tick(1.0);
        }
        assert!((action.progress() - 0.25).abs() < 1e-6);

        manager.resume_actions(id(1), false);
        manager.tick(0.5);
        assert!((action.progress() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn pausing_target_without_actions_is_noop() {
        let manager = ActionManager::detached();
        manager.pause_actions(id(4), false);
        assert!(!manager.has_target(id(4)));

        let action = ActionHandle::new(Delay::new(1.0));
        manager.add_action_locked(&action, id(4));
        assert!(!manager.is_paused(id(4)));
    }

    #[test]
    fn pause_with_children_covers_descendants() {
        let (graph, manager) = with_graph();
        graph.edges.lock().insert(id(0), vec![id(1)]);
        graph.edges.lock().insert(id(1), vec![id(2)]);

        let deep = ActionHandle::new(Delay::new(1.0));
        manager.add_action_locked(&deep, id(2));
        manager.pause_actions(id(0), true);
        manager.tick(0.5);

        assert_eq!(deep.progress(), 0.0);
        assert!(manager.is_paused(id(2)));
    }

    #[test]
    fn action_added_during_tick_runs_on_following_tick() {
        let manager = Arc::new(ActionManager::detached());
        let follow_up = ActionHandle::new(Delay::new(1.0));

        let m = manager.clone();
        let next = follow_up.clone();
        let first = ActionHandle::new(CallFunc::new(move |target| {
            m.add_action_locked(&next, target);
        }));

        manager.add_action_locked(&first, id(1));
        manager.tick(0.25);
        assert_eq!(follow_up.progress(), 0.0, "not stepped in the tick it was added");
        assert_eq!(manager.running_action_count(id(1)), 1);

        manager.tick(0.25);
        assert!((follow_up.progress() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn dead_target_bucket_is_dropped_without_stepping() {
        let (graph, manager) = with_graph();
        let (action, stops) = counting();
        manager.add_action_locked(&action, id(1));

        graph.dead.lock().insert(id(1));
        manager.tick(0.1);

        assert!(!manager.has_target(id(1)));
        assert!(!action.is_registered());
        assert_eq!(stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn removal_by_earlier_action_skips_later_one() {
        let manager = Arc::new(ActionManager::detached());
        let (victim, _) = counting();

        let m = manager.clone();
        let v = victim.clone();
        let killer = ActionHandle::new(CallFunc::new(move |_| {
            m.remove_action_locked(&v);
        }));

        manager.add_action_locked(&killer, id(1));
        manager.add_action_locked(&victim, id(1));
        manager.tick(0.1);

        assert!(!victim.is_registered());
        assert_eq!(manager.running_action_count(id(1)), 0);
    }

    //=====================================================================
    // Self-Removal
    //=====================================================================

    #[test]
    fn call_func_may_remove_itself() {
        let manager = Arc::new(ActionManager::detached());
        let slot: Slot = Arc::new(Mutex::new(None));

        let m = manager.clone();
        let own = slot.clone();
        let action = ActionHandle::new(CallFunc::new(move |_| {
            if let Some(handle) = own.lock().clone() {
                assert!(m.remove_action_locked(&handle));
            }
        }));
        *slot.lock() = Some(action.clone());

        manager.add_action_locked(&action, id(1));
        tick_within(&manager, 0.1);

        assert!(!action.is_registered());
        assert!(!manager.has_target(id(1)), "emptied bucket swept");
        slot.lock().take();
    }

    #[test]
    fn self_removal_during_step_leaves_siblings_stepped_once() {
        let manager = Arc::new(ActionManager::detached());
        let (before, before_steps, _) = stepper(None);
        let (quitter, quitter_steps, quitter_stops) = stepper(Some(&manager));
        let (after, after_steps, _) = stepper(None);

        for action in [&before, &quitter, &after] {
            manager.add_action_locked(action, id(1));
        }

        tick_within(&manager, 0.1);
        assert_eq!(before_steps.load(Ordering::SeqCst), 1);
        assert_eq!(quitter_steps.load(Ordering::SeqCst), 1);
        assert_eq!(after_steps.load(Ordering::SeqCst), 1);
        assert_eq!(quitter_stops.load(Ordering::SeqCst), 1, "stopped after its step");
        assert_eq!(manager.running_action_count(id(1)), 2);

        tick_within(&manager, 0.1);
        assert_eq!(before_steps.load(Ordering::SeqCst), 2);
        assert_eq!(after_steps.load(Ordering::SeqCst), 2);
        assert_eq!(quitter_steps.load(Ordering::SeqCst), 1, "never stepped again");
        assert_eq!(quitter_stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_hook_may_clear_its_own_target() {
        let manager = Arc::new(ActionManager::detached());

        struct ClearOnStop {
            manager: Arc<ActionManager>,
            target: Option<TargetId>,
            stepped: bool,
        }

        impl Action for ClearOnStop {
            fn start(&mut self, target: TargetId) {
                self.target = Some(target);
            }
            fn step(&mut self, _delta: f32) {
                self.stepped = true;
            }
            fn is_done(&self) -> bool {
                self.stepped
            }
            fn stop(&mut self) {
                if let Some(target) = self.target {
                    self.manager.remove_actions_locked(target, false);
                }
            }
        }

        let clearer = ActionHandle::new(ClearOnStop {
            manager: manager.clone(),
            target: None,
            stepped: false,
        });
        let (sibling, sibling_stops) = counting();
        manager.add_action_locked(&clearer, id(1));
        manager.add_action_locked(&sibling, id(1));

        tick_within(&manager, 0.1);

        assert!(!clearer.is_registered());
        assert!(!sibling.is_registered());
        assert_eq!(sibling_stops.load(Ordering::SeqCst), 1);
        assert_eq!(manager.target_count(), 0);
    }

    #[test]
    fn remove_all_from_step_stops_everything() {
        let manager = Arc::new(ActionManager::detached());
        let m = manager.clone();
        let wiper = ActionHandle::new(CallFunc::new(move |_| {
            m.remove_all_actions_locked();
        }));
        let (other, other_stops) = counting();
        let (elsewhere, elsewhere_stops) = counting();

        manager.add_action_locked(&wiper, id(1));
        manager.add_action_locked(&other, id(1));
        manager.add_action_locked(&elsewhere, id(2));

        tick_within(&manager, 0.1);

        assert_eq!(manager.target_count(), 0);
        assert_eq!(other_stops.load(Ordering::SeqCst), 1);
        assert_eq!(elsewhere_stops.load(Ordering::SeqCst), 1);
        assert!(!manager.is_removing_all());
    }

    //=====================================================================
    // Concurrency
    //=====================================================================

    #[test]
    fn concurrent_add_remove_while_ticking() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 300;
        const TARGETS: u32 = 5;

        let manager = Arc::new(ActionManager::detached());
        let running = Arc::new(AtomicBool::new(true));

        let ticker = {
            let manager = manager.clone();
            let running = running.clone();
            thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    manager.tick(0.001);
                }
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let manager = manager.clone();
                thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..PER_PRODUCER {
                        let target = id((p + i) % TARGETS);
                        let action = ActionHandle::new(Delay::new(1_000.0));
                        assert!(manager.add_action_locked(&action, target));
                        assert!(!manager.add_action_locked(&action, target));
                        if i % 3 == 0 {
                            assert!(manager.remove_action_locked(&action));
                        } else {
                            kept.push((target, action));
                        }
                    }
                    kept
                })
            })
            .collect();

        let kept: Vec<(TargetId, ActionHandle)> = producers
            .into_iter()
            .flat_map(|producer| producer.join().unwrap())
            .collect();
        running.store(false, Ordering::SeqCst);
        ticker.join().unwrap();
        manager.tick(0.001);

        for (target, action) in &kept {
            assert_eq!(action.target(), Some(*target));
        }

        let table = manager.table.lock();
        let mut total = 0;
        for (target, entry) in &table.targets {
            assert!(!entry.actions.is_empty(), "empty bucket left for {:?}", target);
            let unique: HashSet<u64> = entry.actions.iter().map(|a| a.id()).collect();
            assert_eq!(unique.len(), entry.actions.len(), "duplicate on {:?}", target);
            total += entry.actions.len();
        }
        drop(table);

        assert_eq!(total, kept.len());
        let counted: usize = (0..TARGETS)
            .map(|t| manager.running_action_count(id(t)))
            .sum();
        assert_eq!(counted, kept.len());
    }

    //=====================================================================
    // Physics
    //=====================================================================

    #[test]
    fn physics_nodes_join_on_next_tick() {
        let (graph, manager) = with_graph();

        assert!(manager.add_physics_node(id(3)));
        assert!(manager.is_physics_node(id(3)));
        assert_eq!(manager.physics_node_count(), 0);

        manager.tick(0.5);
        assert_eq!(manager.physics_node_count(), 1);
        assert_eq!(graph.integrated.lock().as_slice(), &[(id(3), 0.5)]);

        manager.remove_physics_node(id(3));
        manager.tick(0.5);
        assert_eq!(manager.physics_node_count(), 0);
        assert_eq!(graph.integrated.lock().len(), 1);
    }

    #[test]
    fn dead_physics_node_is_retired() {
        let (graph, manager) = with_graph();
        manager.add_physics_node(id(3));
        manager.tick(0.1);

        graph.dead.lock().insert(id(3));
        manager.tick(0.1);
        manager.tick(0.1);

        assert_eq!(manager.physics_node_count(), 0);
        assert_eq!(graph.integrated.lock().len(), 1);
    }
}

//=========================================================================
// Scene Nodes
//=========================================================================
//
// Owner of the targets that timers and actions are bound to.
//
// Architecture:
//   SceneGraph
//     ├─ arena: generation-checked node slots
//     ├─ scheduler: Arc<Scheduler>      (timer activation on enter/exit)
//     └─ actions: Arc<ActionManager>    (holds the graph weakly)
//
//=========================================================================

//=== Module Declarations =================================================

mod scene_graph;

//=== Public API ==========================================================

pub use scene_graph::{SceneGraph, Vec2};

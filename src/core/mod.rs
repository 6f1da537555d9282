//=========================================================================
// Core Systems
//
// Subsystems advanced once per frame by the engine.
//
// Responsibilities:
// - Hand input and resource events from producer threads to the update
//   thread (event)
// - Fire periodic timers (scheduler)
// - Step time-driven actions and physics nodes (action)
// - Own the targets those callbacks are bound to (scene, target)
//
// Notes:
// Every subsystem accepts registration changes from any thread through
// its `*_locked` methods and applies them through the deferred buckets in
// `pending`, so the update thread never iterates a collection that is
// being mutated.
//
//=========================================================================

//=== Module Declarations =================================================

pub mod action;
pub mod event;
pub mod pending;
pub mod scene;
pub mod scheduler;
pub mod target;

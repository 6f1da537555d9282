//=========================================================================
// Aetheric Ticker — Library Root
//
// Per-frame update core: timer scheduling, action management and
// cross-thread event dispatch.
//
// Responsibilities:
// - Expose the frame driver (`Engine`) and its builder
// - Expose the subsystems under `core` for direct use by node and
//   platform glue code
//
// Typical usage:
// ```no_run
// use std::sync::Arc;
// use aetheric_ticker::EngineBuilder;
//
// let engine = Arc::new(EngineBuilder::new().with_tps(60.0).build());
// let update = engine.spawn().unwrap();
// // ... queue events, schedule timers, run actions ...
// update.stop().unwrap();
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` contains the subsystems driven by the engine. Most applications
// reach them through the accessors on `Engine`.
//
pub mod core;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------
//
// `engine` defines the frame driver and the optional update thread.
//
mod engine;

//--- Public Exports ------------------------------------------------------

pub use engine::{Engine, EngineBuilder, EngineError, EngineThread};

//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_ticker::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Engine core
pub use crate::engine::{Engine, EngineBuilder, EngineError, EngineThread};

// Targets
pub use crate::core::target::{TargetGraph, TargetId};

// Timers
pub use crate::core::scheduler::{Scheduler, Timer, TimerMode};

// Actions
pub use crate::core::action::{Action, ActionHandle, ActionManager, CallFunc, Delay};

// Events
pub use crate::core::event::{
    DispatchError, EventCategory, EventDispatcher, EventType, HandlerResult, InputHandler,
    KeyEvent, MotionEvent, TextureId, TextureOp,
};

// Scene nodes
pub use crate::core::scene::{SceneGraph, Vec2};

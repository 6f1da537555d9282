//=========================================================================
// Event Queue
//=========================================================================
//
// Producer/single-consumer hand-off of input, texture and runnable
// events, drained once per frame ahead of timers and actions.
//
// Architecture:
//   EventDispatcher
//     ├─ pending  : DoubleBuffer<Box<Event>>   (producers push)
//     ├─ pool     : Vec<Box<Event>>            (recycled records)
//     └─ handlers : [HandlerChain; 5]          (one per EventCategory)
//
//=========================================================================

//=== Module Declarations =================================================

mod dispatcher;
mod handler;
mod payload;

//=== Public API ==========================================================

pub use dispatcher::{DispatchError, EventDispatcher, TextureHandler, DEFAULT_BACKLOG_WARNING};
pub use handler::{HandlerResult, InputHandler};
pub use payload::{
    Acceleration, EventCategory, EventType, GestureEvent, KeyEvent, MotionEvent, Runnable,
    TextureId, TextureOp, TouchPoint,
};

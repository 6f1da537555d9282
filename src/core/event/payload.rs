//=========================================================================
// Event Types
//=========================================================================
//
// Discriminants and payloads carried through the event queue.
//
// Input payloads arrive already normalized by the platform glue; this
// module never sees a native event object. Pooled events keep every
// payload slot allocated so that refilling a recycled event reuses the
// touch-pointer storage.
//
//=========================================================================

//=== External Dependencies ===============================================

use crossbeam_channel::Sender;
use smallvec::SmallVec;

//=== EventType ===========================================================

/// Discriminant of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    //--- Accelerometer ----------------------------------------------------
    Accelerometer,

    //--- Touch ------------------------------------------------------------
    TouchBegan,
    TouchMoved,
    TouchEnded,
    TouchCancelled,
    TouchPointerBegan,
    TouchPointerEnded,

    //--- Key --------------------------------------------------------------
    KeyDown,
    KeyUp,
    KeyMultiple,

    //--- Double tap -------------------------------------------------------
    DoubleTap,
    DoubleTapEvent,
    SingleTapConfirmed,

    //--- Gesture ----------------------------------------------------------
    OnDown,
    OnFling,
    OnScroll,
    OnLongPress,
    OnShowPress,
    OnSingleTapUp,

    //--- Custom -----------------------------------------------------------
    LoadTexture,
    DeleteTexture,
    UpdateTexture,
    Runnable,
}

impl EventType {
    /// Handler category that consumes this event, or `None` for custom
    /// events run by the dispatcher itself.
    pub fn category(self) -> Option<EventCategory> {
        use EventType::*;
        match self {
            Accelerometer => Some(EventCategory::Accelerometer),
            TouchBegan | TouchMoved | TouchEnded | TouchCancelled | TouchPointerBegan
            | TouchPointerEnded => Some(EventCategory::Touch),
            KeyDown | KeyUp | KeyMultiple => Some(EventCategory::Key),
            DoubleTap | DoubleTapEvent | SingleTapConfirmed => Some(EventCategory::DoubleTap),
            OnDown | OnFling | OnScroll | OnLongPress | OnShowPress | OnSingleTapUp => {
                Some(EventCategory::Gesture)
            }
            LoadTexture | DeleteTexture | UpdateTexture | Runnable => None,
        }
    }

    /// Returns true for gestures that carry two motions and a vector.
    pub fn is_two_motion_gesture(self) -> bool {
        matches!(self, EventType::OnFling | EventType::OnScroll)
    }

    pub(crate) fn texture_op(self) -> Option<TextureOp> {
        match self {
            EventType::LoadTexture => Some(TextureOp::Load),
            EventType::DeleteTexture => Some(TextureOp::Delete),
            EventType::UpdateTexture => Some(TextureOp::Update),
            _ => None,
        }
    }
}

//=== EventCategory =======================================================

/// Handler chain an input event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Key,
    Touch,
    Accelerometer,
    DoubleTap,
    Gesture,
}

impl EventCategory {
    pub const ALL: [EventCategory; 5] = [
        EventCategory::Key,
        EventCategory::Touch,
        EventCategory::Accelerometer,
        EventCategory::DoubleTap,
        EventCategory::Gesture,
    ];

    pub(crate) const fn index(self) -> usize {
        match self {
            EventCategory::Key => 0,
            EventCategory::Touch => 1,
            EventCategory::Accelerometer => 2,
            EventCategory::DoubleTap => 3,
            EventCategory::Gesture => 4,
        }
    }
}

//=== Payloads ============================================================

/// Normalized key event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: i32,
    pub repeat_count: u32,
    pub meta_state: u32,
}

impl KeyEvent {
    pub fn new(key_code: i32) -> Self {
        Self {
            key_code,
            ..Self::default()
        }
    }
}

/// One pointer of a motion event, in surface coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TouchPoint {
    pub id: i32,
    pub x: f32,
    pub y: f32,
}

/// Normalized multi-pointer motion event.
///
/// Up to four pointers are stored inline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionEvent {
    pub pointers: SmallVec<[TouchPoint; 4]>,
    /// Index of the pointer that changed, for pointer began/ended events.
    pub action_index: usize,
}

impl MotionEvent {
    /// Single-pointer event.
    pub fn single(id: i32, x: f32, y: f32) -> Self {
        let mut pointers = SmallVec::new();
        pointers.push(TouchPoint { id, x, y });
        Self {
            pointers,
            action_index: 0,
        }
    }

    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    /// Overwrites this event with `other`, keeping the pointer storage.
    pub(crate) fn copy_from(&mut self, other: &MotionEvent) {
        self.pointers.clear();
        self.pointers.extend_from_slice(&other.pointers);
        self.action_index = other.action_index;
    }

    fn clear(&mut self) {
        self.pointers.clear();
        self.action_index = 0;
    }
}

/// Gesture detector output.
///
/// Flings and scrolls carry both motions plus a vector: velocity for a
/// fling, distance for a scroll. Single-motion gestures leave `second`
/// empty and the vector zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureEvent {
    pub first: MotionEvent,
    pub second: MotionEvent,
    pub vx: f32,
    pub vy: f32,
}

impl GestureEvent {
    fn clear(&mut self) {
        self.first.clear();
        self.second.clear();
        self.vx = 0.0;
        self.vy = 0.0;
    }
}

/// Accelerometer reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Acceleration {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Opaque texture handle owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// GPU-side texture operation requested through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureOp {
    Load,
    Delete,
    Update,
}

impl TextureOp {
    pub(crate) fn event_type(self) -> EventType {
        match self {
            TextureOp::Load => EventType::LoadTexture,
            TextureOp::Delete => EventType::DeleteTexture,
            TextureOp::Update => EventType::UpdateTexture,
        }
    }
}

/// Closure executed on the update thread during the next drain.
pub type Runnable = Box<dyn FnOnce() + Send>;

//=== Event ===============================================================

/// Pooled event record.
///
/// Only the slots matching `kind` are meaningful.
pub(crate) struct Event {
    pub(crate) kind: EventType,
    pub(crate) key: KeyEvent,
    pub(crate) gesture: GestureEvent,
    pub(crate) accel: Acceleration,
    pub(crate) texture: Option<TextureId>,
    pub(crate) done: Option<Sender<()>>,
    pub(crate) runnable: Option<Runnable>,
}

impl Event {
    pub(crate) fn blank() -> Self {
        Self {
            kind: EventType::Runnable,
            key: KeyEvent::default(),
            gesture: GestureEvent::default(),
            accel: Acceleration::default(),
            texture: None,
            done: None,
            runnable: None,
        }
    }

    /// Motion payload for touch, double-tap and single-motion gestures.
    pub(crate) fn motion(&self) -> &MotionEvent {
        &self.gesture.first
    }

    /// Drops owned resources before the event returns to the pool.
    ///
    /// Dropping an unsent completion handle wakes its waiter with a
    /// disconnect.
    pub(crate) fn clear(&mut self) {
        self.key = KeyEvent::default();
        self.gesture.clear();
        self.accel = Acceleration::default();
        self.texture = None;
        self.done = None;
        self.runnable = None;
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

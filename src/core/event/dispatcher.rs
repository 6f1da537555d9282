//=========================================================================
// Event Dispatcher
//=========================================================================
//
// Cross-thread hand-off of input and resource events to the update
// thread.
//
// Event flow:
// ```text
// producer threads ── queue_*_locked ──► pending (FIFO, locked push)
//                                            │  swap under lock
//                                            ▼
// update thread ── process_events_locked ──► working ──► handler chains
//                                            │
//                                            ▼
//                                          pool ──► reused by producers
// ```
//
// An event record is always in exactly one place: the pool, the pending
// list, the working list, or a producer filling it in.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

//=== Internal Dependencies ===============================================

use super::handler::{walk, HandlerChain, HandlerEntry, InputHandler};
use super::payload::{
    Acceleration, Event, EventCategory, EventType, KeyEvent, MotionEvent, Runnable, TextureId,
    TextureOp,
};
use crate::core::pending::DoubleBuffer;
use crate::core::target::TargetId;

//=== Constants ===========================================================

/// Drained batch size above which a backlog warning is logged.
pub const DEFAULT_BACKLOG_WARNING: usize = 256;

//=== DispatchError =======================================================

/// Failure to observe completion of a queued texture event.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("texture event was discarded before the update thread processed it")]
    Disconnected,

    #[error("texture event not processed within {0:?}")]
    Timeout(Duration),
}

/// Consumer side of texture events, run on the update thread.
pub type TextureHandler = Arc<dyn Fn(TextureOp, TextureId) + Send + Sync>;

//=== EventDispatcher =====================================================

/// Thread-safe event queue with a recycle pool and per-category handler
/// chains.
///
/// Producers call the `queue_*` methods from any thread; they only hold
/// the pending lock for one push. The update thread calls
/// [`process_events_locked`](Self::process_events_locked) once per frame.
pub struct EventDispatcher {
    pending: Mutex<DoubleBuffer<Box<Event>>>,
    pool: Mutex<Vec<Box<Event>>>,
    working: Mutex<Vec<Box<Event>>>,
    handlers: RwLock<[HandlerChain; 5]>,
    texture_handler: RwLock<Option<TextureHandler>>,
    dispatch_events: AtomicBool,
    allocated: AtomicUsize,
    pool_limit: Option<usize>,
    backlog_warning: usize,
}

impl EventDispatcher {
    //--- Construction -----------------------------------------------------

    /// Creates a dispatcher with an unbounded pool and dispatching enabled.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(DoubleBuffer::new()),
            pool: Mutex::new(Vec::new()),
            working: Mutex::new(Vec::new()),
            handlers: RwLock::new(Default::default()),
            texture_handler: RwLock::new(None),
            dispatch_events: AtomicBool::new(true),
            allocated: AtomicUsize::new(0),
            pool_limit: None,
            backlog_warning: DEFAULT_BACKLOG_WARNING,
        }
    }

    /// Caps how many recycled events the pool retains. Surplus records are
    /// freed after processing.
    pub fn with_pool_limit(mut self, limit: Option<usize>) -> Self {
        self.pool_limit = limit;
        self
    }

    /// Sets the drained batch size that triggers a backlog warning.
    pub fn with_backlog_warning(mut self, threshold: usize) -> Self {
        self.backlog_warning = threshold;
        self
    }

    //--- Switches ---------------------------------------------------------

    /// Enables or disables input delivery. While disabled, input enqueue
    /// calls are rejected; runnables and texture events are still queued.
    pub fn set_dispatch_events(&self, enabled: bool) {
        self.dispatch_events.store(enabled, Ordering::Release);
        debug!("Input dispatch {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn dispatch_events(&self) -> bool {
        self.dispatch_events.load(Ordering::Acquire)
    }

    /// Installs the update-thread side of texture events.
    pub fn set_texture_handler<F>(&self, handler: F)
    where
        F: Fn(TextureOp, TextureId) + Send + Sync + 'static,
    {
        *self.texture_handler.write() = Some(Arc::new(handler));
    }

    //--- Producers --------------------------------------------------------

    /// Queues a key event. Returns false if `kind` is not a key event,
    /// dispatch is disabled or no key handler is registered.
    pub fn queue_key_event_locked(&self, kind: EventType, event: KeyEvent) -> bool {
        if !self.accepts(kind, EventCategory::Key) {
            return false;
        }
        let mut record = self.obtain(kind);
        record.key = event;
        self.submit(record);
        true
    }

    /// Queues a single-motion event: touch, double-tap, or a gesture other
    /// than fling and scroll.
    pub fn queue_motion_event_locked(&self, kind: EventType, event: &MotionEvent) -> bool {
        let category = match kind.category() {
            Some(c @ (EventCategory::Touch | EventCategory::DoubleTap)) => c,
            Some(EventCategory::Gesture) if !kind.is_two_motion_gesture() => EventCategory::Gesture,
            _ => {
                debug!("{:?} is not a single-motion event", kind);
                return false;
            }
        };
        if !self.accepts(kind, category) {
            return false;
        }
        let mut record = self.obtain(kind);
        record.gesture.first.copy_from(event);
        self.submit(record);
        true
    }

    /// Queues a fling or scroll. `(vx, vy)` is the fling velocity or the
    /// scroll distance.
    pub fn queue_gesture_event_locked(
        &self,
        kind: EventType,
        first: &MotionEvent,
        second: &MotionEvent,
        vx: f32,
        vy: f32,
    ) -> bool {
        if !kind.is_two_motion_gesture() {
            debug!("{:?} is not a two-motion gesture", kind);
            return false;
        }
        if !self.accepts(kind, EventCategory::Gesture) {
            return false;
        }
        let mut record = self.obtain(kind);
        record.gesture.first.copy_from(first);
        record.gesture.second.copy_from(second);
        record.gesture.vx = vx;
        record.gesture.vy = vy;
        self.submit(record);
        true
    }

    /// Queues an accelerometer reading.
    pub fn queue_accelerometer_locked(&self, x: f32, y: f32, z: f32) -> bool {
        if !self.accepts(EventType::Accelerometer, EventCategory::Accelerometer) {
            return false;
        }
        let mut record = self.obtain(EventType::Accelerometer);
        record.accel = Acceleration { x, y, z };
        self.submit(record);
        true
    }

    /// Queues a closure to run on the update thread during the next drain.
    pub fn queue_runnable_locked<F>(&self, runnable: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut record = self.obtain(EventType::Runnable);
        record.runnable = Some(Box::new(runnable) as Runnable);
        self.submit(record);
    }

    /// Queues a texture operation without waiting for it.
    pub fn queue_texture_event_locked(&self, op: TextureOp, texture: TextureId) {
        let mut record = self.obtain(op.event_type());
        record.texture = Some(texture);
        self.submit(record);
    }

    /// Queues a texture operation and blocks until the update thread has
    /// processed it.
    ///
    /// Must not be called from the update thread itself.
    pub fn queue_texture_event_and_wait(
        &self,
        op: TextureOp,
        texture: TextureId,
    ) -> Result<(), DispatchError> {
        let done = self.queue_texture_with_handle(op, texture);
        done.recv().map_err(|_| {
            warn!("Texture {:?} event discarded before processing", texture);
            DispatchError::Disconnected
        })
    }

    /// Like [`queue_texture_event_and_wait`](Self::queue_texture_event_and_wait)
    /// but gives up after `timeout`. The event stays queued.
    pub fn queue_texture_event_and_wait_timeout(
        &self,
        op: TextureOp,
        texture: TextureId,
        timeout: Duration,
    ) -> Result<(), DispatchError> {
        let done = self.queue_texture_with_handle(op, texture);
        done.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => DispatchError::Timeout(timeout),
            RecvTimeoutError::Disconnected => {
                warn!("Texture {:?} event discarded before processing", texture);
                DispatchError::Disconnected
            }
        })
    }

    fn queue_texture_with_handle(
        &self,
        op: TextureOp,
        texture: TextureId,
    ) -> crossbeam_channel::Receiver<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut record = self.obtain(op.event_type());
        record.texture = Some(texture);
        record.done = Some(tx);
        self.submit(record);
        rx
    }

    fn accepts(&self, kind: EventType, category: EventCategory) -> bool {
        if kind.category() != Some(category) {
            debug!("{:?} does not belong to {:?}", kind, category);
            return false;
        }
        if !self.dispatch_events() {
            trace!("Dropped {:?}: dispatch disabled", kind);
            return false;
        }
        if !self.has_handlers(category) {
            trace!("Dropped {:?}: no {:?} handlers", kind, category);
            return false;
        }
        true
    }

    fn obtain(&self, kind: EventType) -> Box<Event> {
        let recycled = self.pool.lock().pop();
        let mut record = recycled.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Box::new(Event::blank())
        });
        record.kind = kind;
        record
    }

    fn submit(&self, record: Box<Event>) {
        self.pending.lock().push(record);
    }

    //--- Consumer ---------------------------------------------------------

    /// Drains every pending event in FIFO order, dispatches it, and
    /// recycles it. Returns the number of events processed.
    ///
    /// The pending lock is held only for the swap. Events queued while
    /// this runs are processed on the next call.
    pub fn process_events_locked(&self) -> usize {
        let mut working = mem::take(&mut *self.working.lock());
        self.pending.lock().swap_into(&mut working);

        let count = working.len();
        if count == 0 {
            *self.working.lock() = working;
            return 0;
        }
        if count > self.backlog_warning {
            warn!("Event backlog: {} events in one drain", count);
        }

        let chains: [Arc<Vec<HandlerEntry>>; 5] = {
            let handlers = self.handlers.read();
            std::array::from_fn(|i| handlers[i].snapshot())
        };
        let texture_handler = self.texture_handler.read().clone();

        for record in working.iter_mut() {
            self.dispatch(record, &chains, texture_handler.as_ref());
        }

        self.recycle(&mut working);
        *self.working.lock() = working;
        trace!("Processed {} events", count);
        count
    }

    /// Discards every pending event without dispatching it. Waiters on
    /// discarded texture events observe [`DispatchError::Disconnected`].
    pub fn discard_pending_locked(&self) -> usize {
        let mut working = mem::take(&mut *self.working.lock());
        self.pending.lock().swap_into(&mut working);
        let count = working.len();
        self.recycle(&mut working);
        *self.working.lock() = working;
        if count > 0 {
            debug!("Discarded {} pending events", count);
        }
        count
    }

    fn dispatch(
        &self,
        record: &mut Event,
        chains: &[Arc<Vec<HandlerEntry>>; 5],
        texture_handler: Option<&TextureHandler>,
    ) {
        let kind = record.kind;

        if let Some(op) = kind.texture_op() {
            match (texture_handler, record.texture) {
                (Some(handler), Some(texture)) => handler(op, texture),
                _ => debug!("No texture handler for {:?}", kind),
            }
            if let Some(done) = record.done.take() {
                let _ = done.send(());
            }
            return;
        }

        let Some(category) = kind.category() else {
            if let Some(run) = record.runnable.take() {
                run();
            }
            return;
        };

        // Disabling dispatch also drops input that was already queued.
        if !self.dispatch_events() {
            return;
        }

        let entries = &chains[category.index()];
        let event: &Event = record;
        walk(entries, category, |handler| match category {
            EventCategory::Key => handler.on_key(kind, &event.key),
            EventCategory::Touch => handler.on_touch(kind, event.motion()),
            EventCategory::Accelerometer => handler.on_accelerometer(&event.accel),
            EventCategory::DoubleTap => handler.on_double_tap(kind, event.motion()),
            EventCategory::Gesture => handler.on_gesture(kind, &event.gesture),
        });
    }

    fn recycle(&self, working: &mut Vec<Box<Event>>) {
        let mut pool = self.pool.lock();
        for mut record in working.drain(..) {
            record.clear();
            match self.pool_limit {
                Some(limit) if pool.len() >= limit => {
                    self.allocated.fetch_sub(1, Ordering::Relaxed);
                }
                _ => pool.push(record),
            }
        }
    }

    //--- Handlers ---------------------------------------------------------

    /// Registers `handler` under `owner` in the `category` chain. Adding an
    /// owner twice updates its priority and handler.
    pub fn add_handler_locked(
        &self,
        category: EventCategory,
        owner: TargetId,
        priority: i32,
        handler: Arc<dyn InputHandler>,
    ) -> bool {
        let fresh = self.handlers.write()[category.index()].add(owner, priority, handler);
        if fresh {
            debug!("Registered {:?} handler {:?} at priority {}", category, owner, priority);
        }
        fresh
    }

    pub fn remove_handler_locked(&self, category: EventCategory, owner: TargetId) -> bool {
        self.handlers.write()[category.index()].remove(owner)
    }

    pub fn set_handler_priority_locked(
        &self,
        category: EventCategory,
        owner: TargetId,
        priority: i32,
    ) -> bool {
        self.handlers.write()[category.index()].set_priority(owner, priority)
    }

    /// Removes `owner` from every chain.
    pub fn remove_owner_handlers_locked(&self, owner: TargetId) -> usize {
        let mut handlers = self.handlers.write();
        handlers
            .iter_mut()
            .map(|chain| chain.remove(owner))
            .filter(|removed| *removed)
            .count()
    }

    /// Clears every handler chain.
    pub fn remove_all_handlers_locked(&self) -> usize {
        let mut handlers = self.handlers.write();
        let removed: usize = handlers.iter_mut().map(HandlerChain::clear).sum();
        debug!("Removed all {} input handlers", removed);
        removed
    }

    pub fn has_handlers(&self, category: EventCategory) -> bool {
        !self.handlers.read()[category.index()].is_empty()
    }

    pub fn handler_count(&self, category: EventCategory) -> usize {
        self.handlers.read()[category.index()].len()
    }

    pub fn handler_priority(&self, category: EventCategory, owner: TargetId) -> Option<i32> {
        self.handlers.read()[category.index()].priority_of(owner)
    }

    //--- Queries ----------------------------------------------------------

    /// Events waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Recycled events ready for reuse.
    pub fn pool_len(&self) -> usize {
        self.pool.lock().len()
    }

    /// Event records currently alive, wherever they are.
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{GestureEvent, HandlerResult, TouchPoint};
    use std::thread;

    //=====================================================================
    // Helpers
    //=====================================================================

    #[derive(Default)]
    struct Recorder {
        keys: Mutex<Vec<i32>>,
        touches: Mutex<Vec<(EventType, usize)>>,
        gestures: Mutex<Vec<(EventType, f32, f32)>>,
        accel: Mutex<Vec<Acceleration>>,
        order: Mutex<Vec<String>>,
    }

    impl InputHandler for Recorder {
        fn on_key(&self, _kind: EventType, event: &KeyEvent) -> HandlerResult {
            self.keys.lock().push(event.key_code);
            self.order.lock().push(format!("key{}", event.key_code));
            HandlerResult::Handled
        }

        fn on_touch(&self, kind: EventType, event: &MotionEvent) -> HandlerResult {
            self.touches.lock().push((kind, event.pointer_count()));
            HandlerResult::Handled
        }

        fn on_accelerometer(&self, accel: &Acceleration) -> HandlerResult {
            self.accel.lock().push(*accel);
            HandlerResult::Handled
        }

        fn on_gesture(&self, kind: EventType, event: &GestureEvent) -> HandlerResult {
            self.gestures.lock().push((kind, event.vx, event.vy));
            HandlerResult::Handled
        }
    }

    fn with_recorder(categories: &[EventCategory]) -> (EventDispatcher, Arc<Recorder>) {
        let dispatcher = EventDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        for category in categories {
            dispatcher.add_handler_locked(*category, TargetId::new(0, 0), 0, recorder.clone());
        }
        (dispatcher, recorder)
    }

    //=====================================================================
    // Queueing
    //=====================================================================

    #[test]
    fn events_are_dispatched_in_fifo_order() {
        let (dispatcher, recorder) = with_recorder(&[EventCategory::Key]);
        for code in 1..=3 {
            assert!(dispatcher.queue_key_event_locked(EventType::KeyDown, KeyEvent::new(code)));
        }
        assert_eq!(dispatcher.pending_len(), 3);
        assert!(recorder.keys.lock().is_empty(), "nothing runs before the drain");

        assert_eq!(dispatcher.process_events_locked(), 3);
        assert_eq!(*recorder.keys.lock(), vec![1, 2, 3]);
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[test]
    fn input_without_handlers_is_rejected() {
        let dispatcher = EventDispatcher::new();
        assert!(!dispatcher.queue_key_event_locked(EventType::KeyDown, KeyEvent::new(1)));
        assert!(!dispatcher.queue_accelerometer_locked(0.0, 0.0, 9.8));
        assert_eq!(dispatcher.pending_len(), 0);
        assert_eq!(dispatcher.allocated_count(), 0);
    }

    #[test]
    fn mismatched_event_type_is_rejected() {
        let (dispatcher, _) = with_recorder(&EventCategory::ALL);
        let motion = MotionEvent::single(0, 1.0, 1.0);
        assert!(!dispatcher.queue_key_event_locked(EventType::TouchBegan, KeyEvent::new(1)));
        assert!(!dispatcher.queue_motion_event_locked(EventType::OnFling, &motion));
        assert!(!dispatcher.queue_gesture_event_locked(
            EventType::OnDown,
            &motion,
            &motion,
            0.0,
            0.0
        ));
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[test]
    fn disabled_dispatch_rejects_input_but_runs_runnables() {
        let (dispatcher, recorder) = with_recorder(&[EventCategory::Key]);
        dispatcher.set_dispatch_events(false);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        assert!(!dispatcher.queue_key_event_locked(EventType::KeyUp, KeyEvent::new(1)));
        dispatcher.queue_runnable_locked(move || flag.store(true, Ordering::SeqCst));

        dispatcher.process_events_locked();
        assert!(ran.load(Ordering::SeqCst));
        assert!(recorder.keys.lock().is_empty());
    }

    #[test]
    fn input_queued_before_disable_is_dropped_at_drain() {
        let (dispatcher, recorder) = with_recorder(&[EventCategory::Key]);
        dispatcher.queue_key_event_locked(EventType::KeyDown, KeyEvent::new(1));
        dispatcher.set_dispatch_events(false);

        assert_eq!(dispatcher.process_events_locked(), 1);
        assert!(recorder.keys.lock().is_empty());
        assert_eq!(dispatcher.pool_len(), 1, "still recycled");
    }

    #[test]
    fn payloads_reach_their_handlers() {
        let (dispatcher, recorder) = with_recorder(&EventCategory::ALL);
        let mut two_finger = MotionEvent::single(0, 1.0, 1.0);
        two_finger.pointers.push(TouchPoint { id: 1, x: 5.0, y: 5.0 });

        dispatcher.queue_motion_event_locked(EventType::TouchPointerBegan, &two_finger);
        dispatcher.queue_gesture_event_locked(EventType::OnFling, &two_finger, &two_finger, 3.0, -4.0);
        dispatcher.queue_motion_event_locked(EventType::OnLongPress, &two_finger);
        dispatcher.queue_accelerometer_locked(0.1, 0.2, 9.8);
        dispatcher.process_events_locked();

        assert_eq!(*recorder.touches.lock(), vec![(EventType::TouchPointerBegan, 2)]);
        assert_eq!(
            *recorder.gestures.lock(),
            vec![(EventType::OnFling, 3.0, -4.0), (EventType::OnLongPress, 0.0, 0.0)]
        );
        assert_eq!(recorder.accel.lock()[0], Acceleration { x: 0.1, y: 0.2, z: 9.8 });
    }

    #[test]
    fn runnables_interleave_with_input_in_fifo_order() {
        let (dispatcher, recorder) = with_recorder(&[EventCategory::Key]);
        let r = recorder.clone();

        dispatcher.queue_key_event_locked(EventType::KeyDown, KeyEvent::new(1));
        dispatcher.queue_runnable_locked(move || r.order.lock().push("run".into()));
        dispatcher.queue_key_event_locked(EventType::KeyDown, KeyEvent::new(2));
        dispatcher.process_events_locked();

        assert_eq!(*recorder.order.lock(), vec!["key1", "run", "key2"]);
    }

    #[test]
    fn events_queued_during_drain_wait_for_next_drain() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let d = dispatcher.clone();
        let h = hits.clone();
        dispatcher.queue_runnable_locked(move || {
            let inner = h.clone();
            d.queue_runnable_locked(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(dispatcher.process_events_locked(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.process_events_locked(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    //=====================================================================
    // Pooling
    //=====================================================================

    #[test]
    fn processed_events_are_reused() {
        let (dispatcher, _) = with_recorder(&[EventCategory::Key]);
        for _ in 0..2 {
            for code in 0..3 {
                dispatcher.queue_key_event_locked(EventType::KeyDown, KeyEvent::new(code));
            }
            dispatcher.process_events_locked();
        }
        assert_eq!(dispatcher.allocated_count(), 3);
        assert_eq!(dispatcher.pool_len(), 3);
    }

    #[test]
    fn pool_limit_frees_surplus_records() {
        let dispatcher = EventDispatcher::new().with_pool_limit(Some(2));
        for _ in 0..5 {
            dispatcher.queue_runnable_locked(|| {});
        }
        dispatcher.process_events_locked();

        assert_eq!(dispatcher.pool_len(), 2);
        assert_eq!(dispatcher.allocated_count(), 2);
    }

    #[test]
    fn records_are_in_exactly_one_place() {
        let dispatcher = EventDispatcher::new();
        let mut seed = 0x2545_f491_u32;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 == 0 {
                dispatcher.process_events_locked();
            } else {
                dispatcher.queue_runnable_locked(|| {});
            }
            assert_eq!(
                dispatcher.pool_len() + dispatcher.pending_len(),
                dispatcher.allocated_count(),
                "every record is pooled or pending between drains"
            );
        }
    }

    #[test]
    fn concurrent_producers_keep_per_producer_order() {
        const PRODUCERS: i32 = 4;
        const PER_PRODUCER: i32 = 200;

        let (dispatcher, recorder) = with_recorder(&[EventCategory::Key]);
        let dispatcher = Arc::new(dispatcher);

        let workers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let d = dispatcher.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        d.queue_key_event_locked(EventType::KeyDown, KeyEvent::new(p * 1000 + i));
                    }
                })
            })
            .collect();

        let mut processed = 0;
        while processed < (PRODUCERS * PER_PRODUCER) as usize {
            processed += dispatcher.process_events_locked();
            thread::yield_now();
        }
        for worker in workers {
            worker.join().unwrap();
        }

        let keys = recorder.keys.lock();
        assert_eq!(keys.len(), processed);
        for p in 0..PRODUCERS {
            let mine: Vec<i32> = keys.iter().copied().filter(|k| k / 1000 == p).collect();
            let expected: Vec<i32> = (0..PER_PRODUCER).map(|i| p * 1000 + i).collect();
            assert_eq!(mine, expected, "producer {} reordered", p);
        }
        assert_eq!(dispatcher.pool_len(), dispatcher.allocated_count());
    }

    //=====================================================================
    // Texture Events
    //=====================================================================

    #[test]
    fn texture_wait_returns_after_processing() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        dispatcher.set_texture_handler(move |op, tex| s.lock().push((op, tex)));

        let d = dispatcher.clone();
        let producer =
            thread::spawn(move || d.queue_texture_event_and_wait(TextureOp::Load, TextureId(7)));

        while !producer.is_finished() {
            dispatcher.process_events_locked();
            thread::yield_now();
        }

        assert_eq!(producer.join().unwrap(), Ok(()));
        assert_eq!(*seen.lock(), vec![(TextureOp::Load, TextureId(7))]);
    }

    #[test]
    fn texture_wait_times_out_without_consumer() {
        let dispatcher = EventDispatcher::new();
        let timeout = Duration::from_millis(10);
        assert_eq!(
            dispatcher.queue_texture_event_and_wait_timeout(TextureOp::Delete, TextureId(1), timeout),
            Err(DispatchError::Timeout(timeout))
        );
        assert_eq!(dispatcher.pending_len(), 1, "event stays queued");
    }

    #[test]
    fn discarding_pending_disconnects_waiters() {
        let dispatcher = Arc::new(EventDispatcher::new());

        let d = dispatcher.clone();
        let producer =
            thread::spawn(move || d.queue_texture_event_and_wait(TextureOp::Update, TextureId(3)));

        while dispatcher.pending_len() == 0 {
            thread::yield_now();
        }
        assert_eq!(dispatcher.discard_pending_locked(), 1);
        assert_eq!(producer.join().unwrap(), Err(DispatchError::Disconnected));
    }

    //=====================================================================
    // Handler Management
    //=====================================================================

    #[test]
    fn handler_registration_is_per_category() {
        let (dispatcher, recorder) = with_recorder(&[EventCategory::Touch]);
        let owner = TargetId::new(0, 0);

        assert!(dispatcher.has_handlers(EventCategory::Touch));
        assert!(!dispatcher.has_handlers(EventCategory::Accelerometer));

        dispatcher.add_handler_locked(EventCategory::Key, owner, 3, recorder.clone());
        assert!(dispatcher.set_handler_priority_locked(EventCategory::Key, owner, 9));
        assert_eq!(dispatcher.handler_priority(EventCategory::Key, owner), Some(9));
        assert_eq!(dispatcher.handler_priority(EventCategory::Touch, owner), Some(0));

        assert!(dispatcher.remove_handler_locked(EventCategory::Touch, owner));
        assert!(!dispatcher.remove_handler_locked(EventCategory::Touch, owner));
        assert_eq!(dispatcher.remove_owner_handlers_locked(owner), 1);
        assert_eq!(dispatcher.handler_count(EventCategory::Key), 0);
    }

    #[test]
    fn remove_all_handlers_empties_every_chain() {
        let (dispatcher, _) = with_recorder(&EventCategory::ALL);
        assert_eq!(dispatcher.remove_all_handlers_locked(), 5);
        for category in EventCategory::ALL {
            assert!(!dispatcher.has_handlers(category));
        }
    }
}

//=========================================================================
// Pending Mutation Buffers
//=========================================================================
//
// Double-buffered mutation sets shared by every per-frame collection.
//
// Architecture:
//   producers → request_add / request_remove → (to_add, to_remove)
//                                                     ↓
//   consumer  → apply() at tick start ─────────→ live
//                                                     ↓
//   consumer  → snapshot_into() → iterate without holding the lock
//
// The live list is only mutated by `apply()` and the consumer's own
// sweeps, so an iteration over a snapshot is never invalidated by an
// add or remove that arrives mid-tick.
//
//=========================================================================

//=== Membership ==========================================================

/// Which bucket of a [`PendingSet`] an item currently occupies.
///
/// `PendingRemove` items are still live (they keep being iterated until
/// the next `apply()`), but are marked for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// In the live list, not marked.
    Live,

    /// Waiting to be merged into the live list.
    PendingAdd,

    /// In the live list, marked for removal at the next merge.
    PendingRemove,

    /// Not tracked at all.
    Absent,
}

//=== PendingSet ==========================================================

/// Live list plus pending-add and pending-remove buckets.
///
/// Items are compared with `PartialEq`; handle types implement identity
/// equality so the same object is never tracked twice.
///
/// # Invariants
///
/// - An item is in at most one of `live`, `to_add`.
/// - Every item in `to_remove` is also in `live`.
/// - After `apply()` both pending buckets are empty.
#[derive(Debug)]
pub struct PendingSet<T> {
    live: Vec<T>,
    to_add: Vec<T>,
    to_remove: Vec<T>,
}

impl<T: PartialEq + Clone> PendingSet<T> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            live: Vec::new(),
            to_add: Vec::new(),
            to_remove: Vec::new(),
        }
    }

    //--- Requests ---------------------------------------------------------

    /// Requests that `item` becomes live at the next merge.
    ///
    /// Returns `true` if the request changed anything. A live item that was
    /// marked for removal is simply unmarked; an item that is already live
    /// or already pending is left alone.
    pub fn request_add(&mut self, item: T) -> bool {
        if let Some(pos) = self.to_remove.iter().position(|t| *t == item) {
            self.to_remove.remove(pos);
            return true;
        }

        if self.live.contains(&item) || self.to_add.contains(&item) {
            return false;
        }

        self.to_add.push(item);
        true
    }

    /// Requests that `item` stops being live at the next merge.
    ///
    /// An item still waiting in `to_add` is cancelled there and never
    /// becomes live. Returns `true` if the request changed anything.
    pub fn request_remove(&mut self, item: &T) -> bool {
        if let Some(pos) = self.to_add.iter().position(|t| t == item) {
            self.to_add.remove(pos);
            return true;
        }

        if self.live.contains(item) && !self.to_remove.contains(item) {
            self.to_remove.push(item.clone());
            return true;
        }

        false
    }

    //--- Merge ------------------------------------------------------------

    /// Merges both pending buckets into the live list.
    ///
    /// Returns `(added, removed)` counts. Insertion order of the live list
    /// is preserved; new items are appended in request order.
    pub fn apply(&mut self) -> (usize, usize) {
        self.apply_with(|_| {})
    }

    /// Like [`apply`](Self::apply), calling `on_removed` for every item
    /// that leaves the live list.
    pub fn apply_with<F>(&mut self, mut on_removed: F) -> (usize, usize)
    where
        F: FnMut(&T),
    {
        let mut added = 0;
        for item in self.to_add.drain(..) {
            if !self.live.contains(&item) {
                self.live.push(item);
                added += 1;
            }
        }

        let mut removed = 0;
        for item in self.to_remove.drain(..) {
            if let Some(pos) = self.live.iter().position(|t| *t == item) {
                self.live.remove(pos);
                on_removed(&item);
                removed += 1;
            }
        }

        (added, removed)
    }

    /// Copies the live list into `out`, reusing its allocation.
    pub fn snapshot_into(&self, out: &mut Vec<T>) {
        out.clear();
        out.extend_from_slice(&self.live);
    }

    /// Drops live items rejected by `keep`, also forgetting any pending
    /// removal for them. Returns how many were dropped.
    pub fn retain_live<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.live.len();
        let to_remove = &mut self.to_remove;
        self.live.retain(|item| {
            let kept = keep(item);
            if !kept {
                to_remove.retain(|t| t != item);
            }
            kept
        });
        before - self.live.len()
    }

    /// Drops every pending add. Returns how many were cancelled.
    pub fn cancel_pending_adds(&mut self) -> usize {
        let cancelled = self.to_add.len();
        self.to_add.clear();
        cancelled
    }

    /// Forgets every item in every bucket.
    pub fn clear(&mut self) {
        self.live.clear();
        self.to_add.clear();
        self.to_remove.clear();
    }

    //--- Queries ----------------------------------------------------------

    /// Reports which bucket `item` occupies.
    pub fn membership(&self, item: &T) -> Membership {
        if self.to_add.contains(item) {
            Membership::PendingAdd
        } else if self.to_remove.contains(item) {
            Membership::PendingRemove
        } else if self.live.contains(item) {
            Membership::Live
        } else {
            Membership::Absent
        }
    }

    /// The authoritative live list.
    pub fn live(&self) -> &[T] {
        &self.live
    }

    /// Number of live items (including ones marked for removal).
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if no item is live.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of items waiting to become live.
    pub fn pending_add_len(&self) -> usize {
        self.to_add.len()
    }

    /// Number of live items marked for removal.
    pub fn pending_remove_len(&self) -> usize {
        self.to_remove.len()
    }
}

impl<T: PartialEq + Clone> Default for PendingSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

//=== DoubleBuffer ========================================================

/// FIFO pending list that the consumer swaps out wholesale.
///
/// Producers push under the owner's lock; the consumer swaps the whole
/// batch into its private working list and processes it after releasing
/// the lock. Both vectors keep their capacity across frames.
#[derive(Debug)]
pub struct DoubleBuffer<T> {
    pending: Vec<T>,
}

impl<T> DoubleBuffer<T> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Appends an item to the pending batch.
    pub fn push(&mut self, item: T) {
        self.pending.push(item);
    }

    /// Moves the pending batch into `working` (which must be empty).
    ///
    /// Afterwards the pending list is empty and owns `working`'s old
    /// allocation.
    pub fn swap_into(&mut self, working: &mut Vec<T>) {
        debug_assert!(working.is_empty(), "working list must be drained first");
        std::mem::swap(&mut self.pending, working);
    }

    /// Number of items waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for DoubleBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

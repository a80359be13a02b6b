//! Reusable-instance pool
//!
//! Arena of slots plus a FIFO queue of idle instances. A slot index is the
//! handle callers keep while an instance is checked out; it is stable for as
//! long as the instance lives, independent of any gameplay id.

use std::collections::VecDeque;

/// Capability required of pooled instances
pub trait Poolable {
    /// Called when the instance leaves the pool
    fn activate(&mut self);
    /// Called when the instance goes back into the pool
    fn deactivate(&mut self);
    fn is_active(&self) -> bool;
}

/// Handle to a pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

/// Generic pool cloning new instances from a prototype
#[derive(Debug, Clone)]
pub struct ObjectPool<T> {
    prototype: T,
    /// Checked-out instance per slot; `None` while the slot is idle or vacant
    slots: Vec<Option<T>>,
    /// Idle instances with the slot they return to, oldest first
    idle: VecDeque<(SlotIndex, T)>,
    /// Slots whose instance was discarded; reused before growing
    vacant: Vec<SlotIndex>,
    /// Label used in log output
    owner: String,
}

impl<T: Poolable + Clone> ObjectPool<T> {
    /// Pre-create `initial_size` inactive instances
    pub fn new(prototype: T, initial_size: usize, owner: Option<&str>) -> Self {
        let mut pool = Self {
            prototype,
            slots: Vec::with_capacity(initial_size),
            idle: VecDeque::with_capacity(initial_size),
            vacant: Vec::new(),
            owner: owner.unwrap_or("pool").to_string(),
        };
        for _ in 0..initial_size {
            let entry = pool.alloc_slot();
            pool.idle.push_back(entry);
        }
        log::debug!("[{}] warmed up with {} instances", pool.owner, initial_size);
        pool
    }

    /// Check out an idle instance, growing the pool if none is left
    pub fn get(&mut self) -> SlotIndex {
        let (index, mut item) = match self.idle.pop_front() {
            Some(entry) => entry,
            None => {
                let entry = self.alloc_slot();
                log::debug!("[{}] exhausted, grew to {} slots", self.owner, self.slots.len());
                entry
            }
        };
        item.activate();
        self.slots[index.0] = Some(item);
        index
    }

    /// Put a checked-out instance back. Returns false (and leaves the pool
    /// untouched) if `index` is not checked out.
    pub fn release(&mut self, index: SlotIndex) -> bool {
        let Some(mut item) = self.slots.get_mut(index.0).and_then(Option::take) else {
            log::warn!("[{}] slot {} is not checked out", self.owner, index.0);
            return false;
        };
        item.deactivate();
        self.idle.push_back((index, item));
        true
    }

    /// Discard every idle instance. Checked-out instances are untouched.
    pub fn reset_all(&mut self) {
        let discarded = self.idle.len();
        self.vacant.extend(self.idle.drain(..).map(|(index, _)| index));
        log::debug!("[{}] discarded {} idle instances", self.owner, discarded);
    }

    /// The instance in a checked-out slot
    pub fn get_ref(&self, index: SlotIndex) -> Option<&T> {
        self.slots.get(index.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: SlotIndex) -> Option<&mut T> {
        self.slots.get_mut(index.0).and_then(Option::as_mut)
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Total slots ever allocated (including vacant ones)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Fresh inactive instance bound to a vacant or newly pushed slot
    fn alloc_slot(&mut self) -> (SlotIndex, T) {
        let mut item = self.prototype.clone();
        item.deactivate();
        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                SlotIndex(self.slots.len() - 1)
            }
        };
        (index, item)
    }
}

//! `Arena<T>`: a size-classed object pool for one GC object kind.
//!
//! A `Vec<Option<Slot<T>>>` plus a free-index stack gives O(1)
//! allocate/deallocate/reuse, the arena idiom standing in for the spec's
//! size-classed pool (§4.2) — each `Arena<T>` is effectively the single size
//! class for objects of kind `T`.

use crate::gc::header::GcHeader;

pub struct Slot<T> {
    pub header: GcHeader,
    pub value: T,
}

#[derive(Default)]
pub struct Arena<T> {
    slots: Vec<Option<Slot<T>>>,
    free: Vec<u32>,
    pub bytes_per_slot: usize,
}

impl<T> Arena<T> {
    pub fn new(bytes_per_slot: usize) -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            bytes_per_slot,
        }
    }

    /// Allocate a slot for `value`, tagged with the collector's current
    /// white, and return its index.
    pub fn alloc(&mut self, value: T, current_white: u8) -> u32 {
        let header = GcHeader::new_white(current_white);
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(Slot { header, value });
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(Slot { header, value }));
            idx
        }
    }

    pub fn get(&self, idx: u32) -> &T {
        &self
            .slots
            .get(idx as usize)
            .and_then(|s| s.as_ref())
            .expect("dangling GC id: slot was freed")
            .value
    }

    pub fn get_mut(&mut self, idx: u32) -> &mut T {
        &mut self
            .slots
            .get_mut(idx as usize)
            .and_then(|s| s.as_mut())
            .expect("dangling GC id: slot was freed")
            .value
    }

    pub fn header(&self, idx: u32) -> GcHeader {
        self.slots[idx as usize].as_ref().unwrap().header
    }

    pub fn header_mut(&mut self, idx: u32) -> &mut GcHeader {
        &mut self.slots[idx as usize].as_mut().unwrap().header
    }

    /// Free a slot, returning its value so the caller (the sweeper) can run
    /// any finalization logic before it's dropped.
    pub fn free(&mut self, idx: u32) -> T {
        let slot = self.slots[idx as usize].take().expect("double free");
        self.free.push(idx);
        slot.value
    }

    pub fn is_live(&self, idx: u32) -> bool {
        self.slots.get(idx as usize).map_or(false, |s| s.is_some())
    }

    /// Iterate all *live* indices, for the sweep pass.
    pub fn live_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i as u32))
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.len() * self.bytes_per_slot
    }
}

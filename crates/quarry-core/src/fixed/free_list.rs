//! The plainest fixed-slot allocator: hand out, hand back.
//!
//! No per-slot tracking beyond the free list itself, which is threaded
//! through vacant entries as slot indices rather than pointers written
//! into freed bytes.

use super::{SlotRef, SlotSpan};
use crate::error::AllocError;
use crate::region::RegionChain;
use std::mem;

#[derive(Debug)]
enum Entry<T> {
    Occupied(T),
    Vacant { next_free: Option<u32> },
}

/// Fixed-slot allocator with caller-managed slot lifecycles.
#[derive(Debug)]
pub struct FreeList<T> {
    slots: Vec<Entry<T>>,
    regions: RegionChain<SlotSpan>,
    free_head: Option<u32>,
    live: usize,
}

impl<T> FreeList<T> {
    /// Creates an allocator with one region of `capacity` slots.
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        let mut list = Self {
            slots: Vec::new(),
            regions: RegionChain::new(),
            free_head: None,
            live: 0,
        };
        list.extend(capacity)?;
        Ok(list)
    }

    /// Appends a region of `capacity` fresh slots and makes them
    /// allocatable.
    pub fn extend(&mut self, capacity: usize) -> Result<(), AllocError> {
        if capacity == 0 {
            return Err(AllocError::InvalidConfig("slot capacity must be nonzero"));
        }
        let start = self.slots.len();
        self.regions.append(SlotSpan {
            start,
            len: capacity,
        });
        // new slots chain among themselves, then onto the old free list
        for i in 0..capacity {
            let next = if i + 1 < capacity {
                Some((start + i + 1) as u32)
            } else {
                self.free_head
            };
            self.slots.push(Entry::Vacant { next_free: next });
        }
        self.free_head = Some(start as u32);
        Ok(())
    }

    /// Takes a slot off the free list. O(1).
    pub fn alloc(&mut self, value: T) -> Result<SlotRef, AllocError> {
        let Some(index) = self.free_head else {
            return Err(AllocError::OutOfMemory {
                requested: mem::size_of::<T>(),
            });
        };
        let next = match self.slots[index as usize] {
            Entry::Vacant { next_free } => next_free,
            Entry::Occupied(_) => unreachable!("free list points at a live slot"),
        };
        self.free_head = next;
        self.slots[index as usize] = Entry::Occupied(value);
        self.live += 1;
        Ok(SlotRef::new(index))
    }

    /// Returns the slot to the free list and hands back its payload.
    /// O(1). Freeing a vacant slot fails instead of corrupting the list.
    pub fn free(&mut self, slot: SlotRef) -> Result<T, AllocError> {
        let i = slot.index as usize;
        match self.slots.get(i) {
            Some(Entry::Occupied(_)) => {}
            _ => return Err(AllocError::StaleHandle),
        }
        let value = match mem::replace(
            &mut self.slots[i],
            Entry::Vacant {
                next_free: self.free_head,
            },
        ) {
            Entry::Occupied(v) => v,
            Entry::Vacant { .. } => return Err(AllocError::StaleHandle),
        };
        self.free_head = Some(slot.index);
        self.live -= 1;
        Ok(value)
    }

    pub fn get(&self, slot: SlotRef) -> Option<&T> {
        match self.slots.get(slot.index as usize) {
            Some(Entry::Occupied(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, slot: SlotRef) -> Option<&mut T> {
        match self.slots.get_mut(slot.index as usize) {
            Some(Entry::Occupied(v)) => Some(v),
            _ => None,
        }
    }

    /// Drops every payload and rebuilds the free list across every
    /// region, in chain order.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = Entry::Vacant { next_free: None };
        }
        self.free_head = None;
        for pos in (0..self.regions.len()).rev() {
            let id = self.regions.chain()[pos];
            let span = *self.regions.page(id);
            for i in (span.start..span.start + span.len).rev() {
                self.slots[i] = Entry::Vacant {
                    next_free: self.free_head,
                };
                self.free_head = Some(i as u32);
            }
        }
        self.live = 0;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn free_count(&self) -> usize {
        self.slots.len() - self.live
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Free slots in pop order. Diagnostic; lets callers compare
    /// free-list state before and after an operation.
    pub fn free_indices(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cur = self.free_head;
        while let Some(i) = cur {
            out.push(i);
            cur = match self.slots[i as usize] {
                Entry::Vacant { next_free } => next_free,
                Entry::Occupied(_) => break,
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_capacity() {
        assert!(FreeList::<u32>::new(0).is_err());
    }

    #[test]
    fn test_alloc_free_roundtrip_restores_free_list() {
        let mut list: FreeList<u32> = FreeList::new(8).unwrap();
        let before = list.free_indices();
        let slot = list.alloc(7).unwrap();
        assert_eq!(list.free(slot).unwrap(), 7);
        assert_eq!(list.free_indices(), before);
    }

    #[test]
    fn test_exhaustion_then_extend() {
        let mut list: FreeList<u8> = FreeList::new(2).unwrap();
        let _a = list.alloc(1).unwrap();
        let _b = list.alloc(2).unwrap();
        assert!(matches!(
            list.alloc(3),
            Err(AllocError::OutOfMemory { .. })
        ));
        list.extend(2).unwrap();
        assert!(list.alloc(3).is_ok());
        assert_eq!(list.region_count(), 2);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut list: FreeList<u32> = FreeList::new(4).unwrap();
        let slot = list.alloc(9).unwrap();
        list.free(slot).unwrap();
        assert_eq!(list.free(slot).unwrap_err(), AllocError::StaleHandle);
    }

    #[test]
    fn test_slot_reuse_is_lifo() {
        let mut list: FreeList<u32> = FreeList::new(4).unwrap();
        let a = list.alloc(1).unwrap();
        list.free(a).unwrap();
        let b = list.alloc(2).unwrap();
        assert_eq!(a, b);
        assert_eq!(*list.get(b).unwrap(), 2);
    }

    #[test]
    fn test_clear_rebuilds_across_regions() {
        let mut list: FreeList<u32> = FreeList::new(2).unwrap();
        list.extend(2).unwrap();
        let _ = list.alloc(1).unwrap();
        let _ = list.alloc(2).unwrap();
        let _ = list.alloc(3).unwrap();
        list.clear();
        assert_eq!(list.live_count(), 0);
        assert_eq!(list.free_indices(), vec![0, 1, 2, 3]);
    }
}

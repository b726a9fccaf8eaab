//! Entry Arena Module
//!
//! Slot storage for cache entries so the recency list can link them by index.

use std::ops::{Index, IndexMut};

// == Entry Arena ==
/// A vector of slots with a free list.
///
/// A slot index stays valid until the value in it is removed; after that the
/// slot may be handed out again.
#[derive(Debug)]
pub struct EntryArena<N> {
    slots: Vec<Option<N>>,
    free: Vec<usize>,
    len: usize,
}

impl<N> EntryArena<N> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    // == Insert ==
    /// Stores `node` and returns its slot, reusing a freed slot when possible.
    pub fn insert(&mut self, node: N) -> usize {
        self.len += 1;
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    // == Remove ==
    /// Takes the node out of `slot`, freeing the slot.
    pub fn remove(&mut self, slot: usize) -> Option<N> {
        let node = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        self.len -= 1;
        Some(node)
    }

    pub fn get(&self, slot: usize) -> Option<&N> {
        self.slots.get(slot)?.as_ref()
    }

    /// Iterates occupied slots with their nodes.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &N)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| node.as_ref().map(|node| (slot, node)))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<N> Default for EntryArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Panics on a vacant slot; callers only index slots they hold.
impl<N> Index<usize> for EntryArena<N> {
    type Output = N;

    fn index(&self, slot: usize) -> &N {
        self.slots[slot].as_ref().expect("vacant arena slot")
    }
}

impl<N> IndexMut<usize> for EntryArena<N> {
    fn index_mut(&mut self, slot: usize) -> &mut N {
        self.slots[slot].as_mut().expect("vacant arena slot")
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_insert_and_get() {
        let mut arena = EntryArena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena[b], "b");
    }

    #[test]
    fn test_arena_remove_frees_slot_for_reuse() {
        let mut arena = EntryArena::new();
        let a = arena.insert("a");
        arena.insert("b");

        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(a), None);

        let c = arena.insert("c");
        assert_eq!(c, a);
        assert_eq!(arena[c], "c");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_arena_remove_vacant_or_unknown_slot() {
        let mut arena = EntryArena::new();
        let a = arena.insert(1);
        arena.remove(a);

        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.remove(42), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_arena_iter_skips_vacant_slots() {
        let mut arena = EntryArena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let c = arena.insert(3);
        arena.remove(b);

        let items: Vec<_> = arena.iter().collect();
        assert_eq!(items, vec![(a, &1), (c, &3)]);
    }
}

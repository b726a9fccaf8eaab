//! LRU Recency List Module
//!
//! Implements Least Recently Used tracking for cache eviction as an
//! intrusive doubly-linked list over arena slots.

use crate::cache::arena::EntryArena;

// == Links ==
/// Position of a node in a recency list.
///
/// `prev` points toward the LRU end and `next` toward the MRU end. Both are
/// `None` when the node is not linked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Links {
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

/// A node that can be threaded onto an [`LruRecencyList`].
pub trait Linked {
    fn links(&self) -> &Links;
    fn links_mut(&mut self) -> &mut Links;
}

// == LRU Recency List ==
/// Orders arena slots from least to most recently used.
///
/// The list only stores its two ends; the links live in the nodes. Every
/// operation is O(1).
#[derive(Debug, Default)]
pub struct LruRecencyList {
    mru: Option<usize>,
    lru: Option<usize>,
}

impl LruRecencyList {
    // == Constructor ==
    /// Creates a new empty recency list.
    pub fn new() -> Self {
        Self { mru: None, lru: None }
    }

    // == Push MRU ==
    /// Links `slot` in as the most recently used node.
    ///
    /// The node must not currently be linked.
    pub fn push_mru<N: Linked>(&mut self, nodes: &mut EntryArena<N>, slot: usize) {
        match self.mru {
            None => {
                *nodes[slot].links_mut() = Links::default();
                self.lru = Some(slot);
            }
            Some(mru) => {
                nodes[mru].links_mut().next = Some(slot);
                *nodes[slot].links_mut() = Links {
                    prev: Some(mru),
                    next: None,
                };
            }
        }
        self.mru = Some(slot);
    }

    // == Touch ==
    /// Moves `slot` to the MRU position.
    pub fn touch<N: Linked>(&mut self, nodes: &mut EntryArena<N>, slot: usize) {
        if self.mru == Some(slot) {
            return;
        }
        self.remove(nodes, slot);
        self.push_mru(nodes, slot);
    }

    // == Remove ==
    /// Unlinks `slot` from wherever it sits and clears its own links.
    pub fn remove<N: Linked>(&mut self, nodes: &mut EntryArena<N>, slot: usize) {
        let Links { prev, next } = *nodes[slot].links();

        if let Some(next) = next {
            nodes[next].links_mut().prev = prev;
        }
        if let Some(prev) = prev {
            nodes[prev].links_mut().next = next;
        }
        if self.mru == Some(slot) {
            self.mru = prev;
        }
        if self.lru == Some(slot) {
            self.lru = next;
        }

        *nodes[slot].links_mut() = Links::default();
    }

    // == Peek LRU ==
    /// Returns the least recently used slot without unlinking it.
    pub fn peek_lru(&self) -> Option<usize> {
        self.lru
    }

    pub fn peek_mru(&self) -> Option<usize> {
        self.mru
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_none()
    }

    /// Walks the list from the LRU end to the MRU end.
    pub fn iter_lru_to_mru<'a, N: Linked>(
        &self,
        nodes: &'a EntryArena<N>,
    ) -> impl Iterator<Item = usize> + 'a {
        std::iter::successors(self.lru, move |&slot| nodes[slot].links().next)
    }
}

//! Insertion Order Module
//!
//! Tracks the order in which keys entered the memory tier, for eviction.

use std::collections::VecDeque;

// == Insertion Order ==
/// Queue of `(key, seq)` slots, oldest at the front.
///
/// Removal is lazy: deleting a key from the store leaves its slot here, and
/// the store skips slots whose `seq` no longer matches a live entry. Each slot
/// is popped or compacted away exactly once, so upkeep is O(1) amortized.
#[derive(Debug, Default)]
pub struct InsertionOrder {
    slots: VecDeque<(String, u64)>,
    next_seq: u64,
}

impl InsertionOrder {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Push ==
    /// Appends a key as the newest slot and returns its sequence number.
    pub fn push(&mut self, key: &str) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.push_back((key.to_string(), seq));
        seq
    }

    // == Pop Oldest ==
    /// Removes and returns the oldest slot, live or stale.
    pub fn pop_oldest(&mut self) -> Option<(String, u64)> {
        self.slots.pop_front()
    }

    // == Peek Oldest ==
    pub fn peek_oldest(&self) -> Option<&(String, u64)> {
        self.slots.front()
    }

    // == Compact ==
    /// Drops every slot for which `is_live` returns false.
    pub fn compact(&mut self, mut is_live: impl FnMut(&str, u64) -> bool) {
        self.slots.retain(|(key, seq)| is_live(key, *seq));
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    // == Length ==
    /// Number of slots, including stale ones.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

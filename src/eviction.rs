//! Two-generation hash LRU.
//!
//! Recently used entries live in the "new" generation, the rest in "old".
//! Reads of "new" entries cost a single hash lookup and never reorder
//! anything; a read of an "old" entry promotes it. Every insertion into
//! "new" (including promotions) bumps a counter, and when the counter reaches
//! the generation capacity the whole "old" generation is dropped and the
//! generations swap.

use std::hash::Hash;
use std::mem;

use rustc_hash::FxHashMap;
use tracing::debug;

/// Bounded map evicting whole generations at once.
///
/// The rotation threshold is half the bound, not the bound itself, and
/// promotions count toward it. Rotating only after `max_entries` insertions
/// would let both generations fill up and hold twice the bound.
#[derive(Debug)]
pub struct TwoGenerationLru<K, V> {
    newer: FxHashMap<K, V>,
    older: FxHashMap<K, V>,
    inserted: usize,
    generation_capacity: usize,
    rotations: u64,
}

impl<K: Hash + Eq + Clone, V> TwoGenerationLru<K, V> {
    /// Creates a map holding at most `max_entries` entries.
    ///
    /// Each generation gets `ceil(max_entries / 2)` insertions before a
    /// rotation, which keeps the total at or below `max_entries`.
    ///
    /// # Panics
    /// Panics if `max_entries` is zero.
    pub fn new(max_entries: usize) -> Self {
        assert!(max_entries > 0, "two-generation LRU needs a positive bound");
        let generation_capacity = max_entries.div_ceil(2);
        Self {
            newer: FxHashMap::with_capacity_and_hasher(generation_capacity, Default::default()),
            older: FxHashMap::default(),
            inserted: 0,
            generation_capacity,
            rotations: 0,
        }
    }

    /// Insertions a generation absorbs before rotating.
    pub fn generation_capacity(&self) -> usize {
        self.generation_capacity
    }

    /// Number of completed rotations.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Looks `key` up without promoting it.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.newer.get(key).or_else(|| self.older.get(key))
    }

    /// Mutable lookup without promotion.
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.newer.get_mut(key) {
            Some(value) => Some(value),
            None => self.older.get_mut(key),
        }
    }

    /// Looks `key` up, promoting it from "old" to "new".
    ///
    /// Returns the value (if present) and the entries evicted by a rotation
    /// the promotion triggered.
    pub fn get(&mut self, key: &K) -> (Option<&mut V>, Vec<(K, V)>) {
        let mut evicted = Vec::new();
        if !self.newer.contains_key(key) {
            if let Some((key, value)) = self.older.remove_entry(key) {
                evicted = self.insert_new(key, value);
            }
        }
        // A promotion may land in a generation that has just become "old".
        (self.peek_mut(key), evicted)
    }

    /// Inserts or updates `key`. Returns the entries evicted by a rotation.
    pub fn set(&mut self, key: K, value: V) -> Vec<(K, V)> {
        if let Some(slot) = self.newer.get_mut(&key) {
            *slot = value;
            return Vec::new();
        }
        self.older.remove(&key);
        self.insert_new(key, value)
    }

    /// Removes `key` from whichever generation holds it.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.newer.remove(key).or_else(|| self.older.remove(key))
    }

    /// Returns `true` if either generation holds `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.newer.contains_key(key) || self.older.contains_key(key)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.newer.len() + self.older.len()
    }

    /// Returns `true` when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates every retained entry, "new" generation first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.newer.iter().chain(self.older.iter())
    }

    /// Iterates every retained value mutably.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.newer.values_mut().chain(self.older.values_mut())
    }

    /// Drops every entry and resets the counter.
    pub fn clear(&mut self) {
        self.newer.clear();
        self.older.clear();
        self.inserted = 0;
    }

    fn insert_new(&mut self, key: K, value: V) -> Vec<(K, V)> {
        self.newer.insert(key, value);
        self.inserted += 1;
        if self.inserted < self.generation_capacity {
            return Vec::new();
        }
        self.rotate()
    }

    fn rotate(&mut self) -> Vec<(K, V)> {
        let fresh = FxHashMap::with_capacity_and_hasher(self.generation_capacity, Default::default());
        let retired = mem::replace(&mut self.newer, fresh);
        let dropped = mem::replace(&mut self.older, retired);
        self.inserted = 0;
        self.rotations += 1;
        debug!(
            evicted = dropped.len(),
            retained = self.older.len(),
            rotation = self.rotations,
            "forest.lru.rotate"
        );
        dropped.into_iter().collect()
    }
}

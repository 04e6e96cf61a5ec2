//! Memoization table used by the rewriter (visited map) and by the BDD
//! manager (computed table).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

/// A cache backed by [HashMap] that counts hits and misses.
///
/// Entries are write-once: inserting a key that is already present keeps the
/// first value.
#[derive(Debug)]
pub struct Cache<K, V> {
    map: HashMap<K, V>,
    hits: usize,
    misses: usize,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<K, V> Cache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of cache hits.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the number of cache misses.
    pub fn misses(&self) -> usize {
        self.misses
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq,
    V: Copy,
{
    /// Looks up a key in the cache.
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.map.get(key) {
            Some(&v) => {
                self.hits += 1;
                Some(v)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a result, returning the value that is now cached for `key`.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) -> V {
        match self.map.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => *entry.insert(value),
        }
    }
}

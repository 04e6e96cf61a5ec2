//! Hash-consing node storage.
//!
//! Values live in a plain `Vec` indexed by their id, and a hash map from value
//! to id guarantees that every distinct value is stored exactly once:
//!
//! ```text
//! data:  [v0, v1, v2, ...]      (indexed by id)
//! index: {v0 -> 0, v1 -> 1, ...}
//! ```
//!
//! Nodes are never freed. Ids are therefore stable for the lifetime of the
//! storage and can be compared directly to test structural equality.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct Storage<T> {
    data: Vec<T>,
    index: HashMap<T, u32>,
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Storage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        (id as usize) < self.data.len()
    }
}

impl<T> Storage<T>
where
    T: Copy + Eq + Hash,
{
    /// Returns the value with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this storage.
    pub fn value(&self, id: u32) -> T {
        assert!(self.contains(id), "Index {} is not occupied (size {})", id, self.data.len());
        self.data[id as usize]
    }

    /// Looks up the id of an already stored value.
    pub fn find(&self, value: &T) -> Option<u32> {
        self.index.get(value).copied()
    }

    /// Returns the id of `value`, storing it first if it is new.
    pub fn put(&mut self, value: T) -> u32 {
        if let Some(&id) = self.index.get(&value) {
            return id;
        }
        let Ok(id) = u32::try_from(self.data.len()) else {
            panic!("Storage is full");
        };
        self.data.push(value);
        self.index.insert(value, id);
        id
    }
}

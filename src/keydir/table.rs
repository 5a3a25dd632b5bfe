//! Keydir implementation
//!
//! HashMap-based index with RwLock for concurrency.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use super::KeydirEntry;

/// Concurrent key → [`KeydirEntry`] map
///
/// The only mutations are [`put`](Self::put) (writers) and
/// [`compare_and_update`](Self::compare_and_update) (compaction). A `put`
/// always wins; a relocation only lands if nothing changed in between.
#[derive(Default)]
pub struct Keydir {
    map: RwLock<HashMap<Vec<u8>, KeydirEntry>>,
}

impl Keydir {
    /// Create a new empty Keydir
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the current entry for a key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<KeydirEntry> {
        self.map.read().get(key).copied()
    }

    /// Insert or overwrite a key's entry (write lock)
    ///
    /// Returns the entry it replaced, if any.
    pub fn put(&self, key: Vec<u8>, entry: KeydirEntry) -> Option<KeydirEntry> {
        self.map.write().insert(key, entry)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.map.read().contains_key(key)
    }

    /// Apply `updater` to the entry only if it still equals `expected`
    ///
    /// Returns whether the update was applied. A missing key or any field
    /// that differs (a write raced ahead) leaves the entry untouched.
    pub fn compare_and_update<F>(&self, key: &[u8], expected: &KeydirEntry, updater: F) -> bool
    where
        F: FnOnce(&mut KeydirEntry),
    {
        let mut map = self.map.write();
        match map.get_mut(key) {
            Some(entry) if entry == expected => {
                updater(entry);
                true
            }
            _ => false,
        }
    }

    /// Ids of every segment some entry currently points into
    pub fn snapshot(&self) -> BTreeSet<u64> {
        self.map.read().values().map(|e| e.segment_id).collect()
    }

    /// Copy of all entries sorted by key (for comparison and debugging)
    pub fn entries(&self) -> Vec<(Vec<u8>, KeydirEntry)> {
        let mut entries: Vec<_> = self
            .map
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), *e))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Bytes the live records would occupy with zero duplication
    pub fn live_data_size(&self) -> u64 {
        self.map
            .read()
            .iter()
            .map(|(k, e)| e.frame_len(k.len() as u64))
            .sum()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

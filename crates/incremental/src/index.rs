//! Per-key entry index used by join.
//!
//! An `Index` groups entries by a key and can consolidate ("compact") the
//! entries of a key so that each value identity appears at most once with
//! its summed multiplicity.

use crate::multiset::Entry;
use core::fmt;
use core::hash::Hash;
use hashbrown::HashMap;
use std::rc::Rc;

/// Extracts the identity used to group equal values during compaction.
pub type Identity<V> = Rc<dyn Fn(&V) -> String>;

/// Key -> entries map with identity-aware compaction.
pub struct Index<K, V> {
    index: HashMap<K, Vec<Entry<V>>>,
    identity: Identity<V>,
}

impl<K, V> Index<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    /// Creates an empty index grouping values by `identity`.
    pub fn new(identity: Identity<V>) -> Self {
        Self {
            index: HashMap::new(),
            identity,
        }
    }

    /// Appends an entry under `key`. Zero-multiplicity entries are ignored.
    pub fn add(&mut self, key: K, entry: Entry<V>) {
        if entry.is_noop() {
            return;
        }
        self.index.entry(key).or_default().push(entry);
    }

    /// Returns the entries stored under `key`.
    pub fn get(&self, key: &K) -> &[Entry<V>] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates the keys that hold entries.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.index.keys()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no key holds entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total number of stored entries across keys.
    pub fn entry_count(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    /// Appends every entry of `other`.
    pub fn extend(&mut self, other: &Index<K, V>) {
        for (key, entries) in &other.index {
            self.index
                .entry(key.clone())
                .or_default()
                .extend(entries.iter().cloned());
        }
    }

    /// Pairs every entry of `self` with every entry of `other` stored under
    /// the same key. A pair's multiplicity is the product of its inputs'.
    pub fn join<R, O>(&self, other: &Index<K, R>, combine: &dyn Fn(&V, &R) -> O) -> Vec<Entry<O>> {
        let mut output = Vec::new();
        for (key, left) in &self.index {
            let Some(right) = other.index.get(key) else {
                continue;
            };
            for l in left {
                for r in right {
                    output.push(Entry::new(
                        combine(&l.value, &r.value),
                        l.multiplicity * r.multiplicity,
                    ));
                }
            }
        }
        output
    }

    /// Compacts the given keys: entries with the same identity and equal
    /// values are merged, zero totals dropped, and emptied keys removed.
    pub fn compact<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>)
    where
        K: 'a,
    {
        for key in keys {
            let Some(entries) = self.index.remove(key) else {
                continue;
            };
            let compacted = consolidate(entries, self.identity.as_ref());
            if !compacted.is_empty() {
                self.index.insert(key.clone(), compacted);
            }
        }
    }

    /// Compacts every key.
    pub fn compact_all(&mut self) {
        let keys: Vec<K> = self.index.keys().cloned().collect();
        self.compact(keys.iter());
    }
}

/// Merges entries of the same identity. The survivor carries the latest
/// inserted value, or the latest value when nothing was inserted.
fn consolidate<V>(entries: Vec<Entry<V>>, identity: &dyn Fn(&V) -> String) -> Vec<Entry<V>> {
    let mut output: Vec<(Entry<V>, bool)> = Vec::with_capacity(entries.len());
    let mut slots: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        let inserted = entry.multiplicity > 0;
        match slots.get(&identity(&entry.value)) {
            Some(&i) => {
                let (kept, kept_inserted) = &mut output[i];
                kept.multiplicity += entry.multiplicity;
                if inserted || !*kept_inserted {
                    kept.value = entry.value;
                    *kept_inserted |= inserted;
                }
            }
            None => {
                slots.insert(identity(&entry.value), output.len());
                output.push((entry, inserted));
            }
        }
    }
    output
        .into_iter()
        .map(|(entry, _)| entry)
        .filter(|entry| !entry.is_noop())
        .collect()
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Index<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.index.iter()).finish()
    }
}

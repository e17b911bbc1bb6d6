//! Z-set entries and lazy multisets.
//!
//! A `Multiset` is a recipe for producing entries rather than a buffer of
//! them: `map`, `filter` and `negate` wrap the parent and run again every
//! time the result is iterated.

use core::fmt;
use core::hash::Hash;
use hashbrown::HashMap;
use std::rc::Rc;

/// A value paired with its signed multiplicity.
///
/// - positive multiplicity: net additions
/// - negative multiplicity: net removals
/// - zero: no effect
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entry<T> {
    /// The value being changed
    pub value: T,
    /// Net number of occurrences added (or removed, when negative)
    pub multiplicity: i64,
}

impl<T> Entry<T> {
    /// Creates an entry with the given multiplicity.
    #[inline]
    pub fn new(value: T, multiplicity: i64) -> Self {
        Self {
            value,
            multiplicity,
        }
    }

    /// Creates an insertion entry (+1).
    #[inline]
    pub fn insert(value: T) -> Self {
        Self::new(value, 1)
    }

    /// Creates a deletion entry (-1).
    #[inline]
    pub fn delete(value: T) -> Self {
        Self::new(value, -1)
    }

    /// Returns true if this is an insertion (multiplicity > 0).
    #[inline]
    pub fn is_insert(&self) -> bool {
        self.multiplicity > 0
    }

    /// Returns true if this is a deletion (multiplicity < 0).
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.multiplicity < 0
    }

    /// Returns true if this entry has no effect.
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.multiplicity == 0
    }

    /// Maps the value, keeping the multiplicity.
    #[inline]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Entry<U> {
        Entry::new(f(self.value), self.multiplicity)
    }

    /// Returns the entry with its multiplicity negated.
    #[inline]
    pub fn negate(self) -> Self {
        Self::new(self.value, -self.multiplicity)
    }
}

type Producer<T> = Rc<dyn Fn() -> Box<dyn Iterator<Item = Entry<T>>>>;

/// A lazy, re-iterable sequence of entries.
///
/// Cloning is cheap and shares the underlying producer.
pub struct Multiset<T> {
    producer: Producer<T>,
}

impl<T> Clone for Multiset<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Rc::clone(&self.producer),
        }
    }
}

impl<T: Clone + 'static> Multiset<T> {
    /// Creates a multiset over a fixed list of entries.
    pub fn new(entries: Vec<Entry<T>>) -> Self {
        let entries = Rc::new(entries);
        Self {
            producer: Rc::new(move || {
                let entries = Rc::clone(&entries);
                Box::new((0..entries.len()).map(move |i| entries[i].clone()))
            }),
        }
    }

    /// Creates an empty multiset.
    pub fn empty() -> Self {
        Self {
            producer: Rc::new(|| Box::new(core::iter::empty())),
        }
    }

    /// Creates a multiset where every value has multiplicity +1.
    pub fn inserts(values: impl IntoIterator<Item = T>) -> Self {
        Self::new(values.into_iter().map(Entry::insert).collect())
    }

    /// Iterates the entries, running every pending transformation.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Entry<T>>> {
        (self.producer)()
    }

    /// Lazily maps every value.
    pub fn map<U, F>(&self, f: F) -> Multiset<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let parent = self.clone();
        let f = Rc::new(f);
        Multiset {
            producer: Rc::new(move || {
                let f = Rc::clone(&f);
                Box::new(
                    parent
                        .iter()
                        .map(move |e| Entry::new(f(&e.value), e.multiplicity)),
                )
            }),
        }
    }

    /// Lazily keeps the entries whose value satisfies `predicate`,
    /// regardless of sign.
    pub fn filter<F>(&self, predicate: F) -> Multiset<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let parent = self.clone();
        let predicate = Rc::new(predicate);
        Multiset {
            producer: Rc::new(move || {
                let predicate = Rc::clone(&predicate);
                Box::new(parent.iter().filter(move |e| predicate(&e.value)))
            }),
        }
    }

    /// Lazily flips the sign of every multiplicity.
    pub fn negate(&self) -> Multiset<T> {
        let parent = self.clone();
        Multiset {
            producer: Rc::new(move || Box::new(parent.iter().map(Entry::negate))),
        }
    }

    /// Lazily chains `other` after `self`.
    pub fn concat(&self, other: &Multiset<T>) -> Multiset<T> {
        let (first, second) = (self.clone(), other.clone());
        Multiset {
            producer: Rc::new(move || Box::new(first.iter().chain(second.iter()))),
        }
    }

    /// Collects the entries.
    pub fn to_vec(&self) -> Vec<Entry<T>> {
        self.iter().collect()
    }

    /// Returns true if iterating yields no entries.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Sums multiplicities per distinct value, dropping zero totals. Values
    /// keep the order in which they were first seen.
    pub fn consolidate(&self) -> Vec<Entry<T>>
    where
        T: Hash + Eq,
    {
        let mut totals: HashMap<T, i64> = HashMap::new();
        let mut order = Vec::new();
        for entry in self.iter() {
            match totals.get_mut(&entry.value) {
                Some(total) => *total += entry.multiplicity,
                None => {
                    order.push(entry.value.clone());
                    totals.insert(entry.value, entry.multiplicity);
                }
            }
        }
        order
            .into_iter()
            .filter_map(|value| {
                let total = totals.get(&value).copied().unwrap_or(0);
                (total != 0).then(|| Entry::new(value, total))
            })
            .collect()
    }
}

impl<T: Clone + 'static> FromIterator<Entry<T>> for Multiset<T> {
    fn from_iter<I: IntoIterator<Item = Entry<T>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T: Clone + 'static> From<Vec<Entry<T>>> for Multiset<T> {
    fn from(entries: Vec<Entry<T>>) -> Self {
        Self::new(entries)
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Multiset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

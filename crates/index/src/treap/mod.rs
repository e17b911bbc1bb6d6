//! Persistent treap keyed by an explicit comparator.
//!
//! Cloning a `Treap` is O(1): clones share structure and diverge on write.
//! Set sources rely on this to snapshot their contents at the start of a
//! transaction and restore them on rollback.

mod iter;
mod node;

pub use iter::TreapIter;

use crate::comparator::{Comparator, DynComparator};
use core::fmt;
use node::{merge, replace, size, split, Link, Node};
use std::rc::Rc;

/// An ordered set of values under a comparator. Values that compare equal
/// are the same element: inserting one replaces the other.
pub struct Treap<T> {
    root: Link<T>,
    comparator: DynComparator<T>,
    seed: u64,
}

impl<T> Clone for Treap<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            comparator: Rc::clone(&self.comparator),
            seed: self.seed,
        }
    }
}

impl<T: Clone> Treap<T> {
    /// Creates an empty treap ordered by `comparator`.
    pub fn new(comparator: impl Comparator<T> + 'static) -> Self {
        Self::with_comparator(Rc::new(comparator))
    }

    /// Creates an empty treap sharing an existing comparator.
    pub fn with_comparator(comparator: DynComparator<T>) -> Self {
        Self {
            root: None,
            comparator,
            seed: 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Returns the comparator.
    pub fn comparator(&self) -> DynComparator<T> {
        Rc::clone(&self.comparator)
    }

    /// Returns the number of values.
    #[inline]
    pub fn len(&self) -> usize {
        size(&self.root)
    }

    /// Returns true if the treap holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Finds the stored value equal to `key`.
    pub fn get(&self, key: &T) -> Option<&T> {
        let mut link = &self.root;
        while let Some(node) = link {
            match self.comparator.compare(key, &node.value) {
                core::cmp::Ordering::Equal => return Some(&node.value),
                core::cmp::Ordering::Less => link = &node.left,
                core::cmp::Ordering::Greater => link = &node.right,
            }
        }
        None
    }

    /// Returns true if a value equal to `key` is stored.
    #[inline]
    pub fn contains(&self, key: &T) -> bool {
        self.get(key).is_some()
    }

    /// Inserts `value`, returning the equal value it replaced, if any.
    pub fn insert(&mut self, value: T) -> Option<T> {
        if let Some(existing) = self.get(&value).cloned() {
            self.root = replace(&self.root, value, self.comparator.as_ref());
            return Some(existing);
        }
        let priority = self.next_priority();
        let (left, right) = split(&self.root, &value, self.comparator.as_ref(), false);
        self.root = merge(merge(left, Some(Node::leaf(value, priority))), right);
        None
    }

    /// Removes the value equal to `key`, returning it.
    pub fn remove(&mut self, key: &T) -> Option<T> {
        let removed = self.get(key).cloned()?;
        let cmp = self.comparator.as_ref();
        let (less, rest) = split(&self.root, key, cmp, false);
        let (_equal, greater) = split(&rest, key, cmp, true);
        self.root = merge(less, greater);
        Some(removed)
    }

    /// Returns the smallest value.
    pub fn first(&self) -> Option<&T> {
        let mut node = self.root.as_ref()?;
        while let Some(left) = &node.left {
            node = left;
        }
        Some(&node.value)
    }

    /// Returns the largest value.
    pub fn last(&self) -> Option<&T> {
        let mut node = self.root.as_ref()?;
        while let Some(right) = &node.right {
            node = right;
        }
        Some(&node.value)
    }

    /// Iterates values in comparator order.
    pub fn iter(&self) -> TreapIter<'_, T> {
        TreapIter::new(&self.root)
    }

    /// Collects the values in order.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Removes every value, keeping the comparator.
    pub fn clear(&mut self) {
        self.root = None;
    }

    /// Returns true if both treaps share the same root allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// splitmix64 step; priorities only need to be well spread.
    fn next_priority(&mut self) -> u64 {
        self.seed = self.seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.seed;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl<'a, T> IntoIterator for &'a Treap<T> {
    type Item = &'a T;
    type IntoIter = TreapIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        TreapIter::new(&self.root)
    }
}

impl<T: fmt::Debug> fmt::Debug for Treap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(TreapIter::new(&self.root)).finish()
    }
}

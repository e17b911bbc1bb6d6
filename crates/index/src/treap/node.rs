//! Treap node definitions and the split/merge primitives.
//!
//! Nodes are immutable once built and shared through `Rc`; every update
//! copies the path from the root to the changed node.

use crate::comparator::Comparator;
use core::cmp::Ordering;
use std::rc::Rc;

/// Link to a subtree.
pub(crate) type Link<T> = Option<Rc<Node<T>>>;

/// A node in the treap.
#[derive(Debug)]
pub(crate) struct Node<T> {
    pub(crate) value: T,
    pub(crate) priority: u64,
    pub(crate) size: usize,
    pub(crate) left: Link<T>,
    pub(crate) right: Link<T>,
}

impl<T: Clone> Node<T> {
    /// Creates a leaf.
    pub(crate) fn leaf(value: T, priority: u64) -> Rc<Self> {
        Rc::new(Self {
            value,
            priority,
            size: 1,
            left: None,
            right: None,
        })
    }

    /// Copies `self` with new children.
    pub(crate) fn with_children(&self, left: Link<T>, right: Link<T>) -> Rc<Self> {
        Rc::new(Self {
            value: self.value.clone(),
            priority: self.priority,
            size: 1 + size(&left) + size(&right),
            left,
            right,
        })
    }

    /// Copies `self` holding a different value.
    pub(crate) fn with_value(&self, value: T) -> Rc<Self> {
        Rc::new(Self {
            value,
            priority: self.priority,
            size: self.size,
            left: self.left.clone(),
            right: self.right.clone(),
        })
    }
}

#[inline]
pub(crate) fn size<T>(link: &Link<T>) -> usize {
    link.as_ref().map_or(0, |n| n.size)
}

/// Splits `link` into nodes ordered before `value` and the rest. With
/// `equal_left`, nodes comparing equal go to the left half.
pub(crate) fn split<T: Clone>(
    link: &Link<T>,
    value: &T,
    cmp: &dyn Comparator<T>,
    equal_left: bool,
) -> (Link<T>, Link<T>) {
    let Some(node) = link else {
        return (None, None);
    };
    let goes_left = match cmp.compare(&node.value, value) {
        Ordering::Less => true,
        Ordering::Equal => equal_left,
        Ordering::Greater => false,
    };
    if goes_left {
        let (l, r) = split(&node.right, value, cmp, equal_left);
        (Some(node.with_children(node.left.clone(), l)), r)
    } else {
        let (l, r) = split(&node.left, value, cmp, equal_left);
        (l, Some(node.with_children(r, node.right.clone())))
    }
}

/// Joins two treaps where every value in `a` orders before every value in `b`.
pub(crate) fn merge<T: Clone>(a: Link<T>, b: Link<T>) -> Link<T> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => {
            if a.priority > b.priority {
                let right = merge(a.right.clone(), Some(b));
                Some(a.with_children(a.left.clone(), right))
            } else {
                let left = merge(Some(a), b.left.clone());
                Some(b.with_children(left, b.right.clone()))
            }
        }
    }
}

/// Replaces the value equal to `value` along a copied path.
pub(crate) fn replace<T: Clone>(link: &Link<T>, value: T, cmp: &dyn Comparator<T>) -> Link<T> {
    let node = link.as_ref()?;
    Some(match cmp.compare(&value, &node.value) {
        Ordering::Equal => node.with_value(value),
        Ordering::Less => node.with_children(replace(&node.left, value, cmp), node.right.clone()),
        Ordering::Greater => node.with_children(node.left.clone(), replace(&node.right, value, cmp)),
    })
}

//! Comparator implementations for ordered structures.
//!
//! Set sources and tree views keep their contents ordered by an explicit
//! comparator rather than by `Ord`, so the same values can be kept under
//! several orderings at once.

use core::cmp::Ordering;
use std::rc::Rc;
use zql_core::{Record, ID_FIELD};

/// Sort order for a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    /// Ascending order (smallest first)
    Asc,
    /// Descending order (largest first)
    Desc,
}

impl Order {
    /// Applies this order to a comparison result.
    #[inline]
    pub fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }
}

/// Trait for comparing values.
pub trait Comparator<K> {
    /// Compares two values according to the comparator's ordering.
    fn compare(&self, a: &K, b: &K) -> Ordering;

    /// Returns true if a < b according to this comparator.
    fn is_less(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Returns true if a <= b according to this comparator.
    fn is_less_or_equal(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) != Ordering::Greater
    }

    /// Returns true if a > b according to this comparator.
    fn is_greater(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Greater
    }

    /// Returns true if a == b according to this comparator.
    fn is_equal(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

impl<K, F> Comparator<K> for F
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}

/// Shared, type-erased comparator.
pub type DynComparator<K> = Rc<dyn Comparator<K>>;

/// Comparator for values that implement `Ord`.
#[derive(Clone, Copy, Debug)]
pub struct SimpleComparator {
    order: Order,
}

impl SimpleComparator {
    /// Creates a new simple comparator with the given order.
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    /// Creates an ascending comparator.
    pub fn asc() -> Self {
        Self::new(Order::Asc)
    }

    /// Creates a descending comparator.
    pub fn desc() -> Self {
        Self::new(Order::Desc)
    }

    /// Returns the order of this comparator.
    pub fn order(&self) -> Order {
        self.order
    }
}

impl<K: Ord> Comparator<K> for SimpleComparator {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self.order.apply(a.cmp(b))
    }
}

/// Orders records by a list of field paths, then by `id` ascending so that
/// distinct records never compare equal unless they share an identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldComparator {
    fields: Vec<(String, Order)>,
}

impl FieldComparator {
    /// Creates a comparator over the given `(field, order)` pairs.
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = (S, Order)>) -> Self {
        Self {
            fields: fields.into_iter().map(|(f, o)| (f.into(), o)).collect(),
        }
    }

    /// Orders by identity only.
    pub fn by_id() -> Self {
        Self::default()
    }

    /// Appends another ordering field.
    pub fn then(mut self, field: impl Into<String>, order: Order) -> Self {
        self.fields.push((field.into(), order));
        self
    }

    /// Returns the configured ordering fields (without the implicit id).
    pub fn fields(&self) -> &[(String, Order)] {
        &self.fields
    }
}

impl Comparator<Record> for FieldComparator {
    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for (field, order) in &self.fields {
            let cmp = order.apply(a.get_path(field).cmp(&b.get_path(field)));
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        a.get(ID_FIELD).cmp(&b.get(ID_FIELD))
    }
}

//! ZQL Index - ordered structures for ZQL sources and views.
//!
//! This crate provides:
//!
//! - `Comparator`: explicit orderings (`SimpleComparator` for `Ord` values,
//!   `FieldComparator` for records, or any `Fn(&T, &T) -> Ordering`)
//! - `Treap`: a persistent balanced tree keyed by a comparator, with O(1)
//!   snapshots
//!
//! # Example
//!
//! ```rust
//! use zql_index::{SimpleComparator, Treap};
//!
//! let mut tree = Treap::new(SimpleComparator::asc());
//! tree.insert(3);
//! tree.insert(1);
//! let snapshot = tree.clone();
//! tree.insert(2);
//!
//! assert_eq!(tree.to_vec(), vec![1, 2, 3]);
//! assert_eq!(snapshot.to_vec(), vec![1, 3]);
//! ```

pub mod comparator;
pub mod treap;

pub use comparator::{Comparator, DynComparator, FieldComparator, Order, SimpleComparator};
pub use treap::{Treap, TreapIter};

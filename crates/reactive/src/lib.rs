//! ZQL Reactive - materialized views over ZQL dataflows.
//!
//! Views are the terminal sinks of a dataflow graph. They keep a private
//! snapshot of their stream up to date and call their subscribers once the
//! whole graph has settled for a version.
//!
//! # Core Concepts
//!
//! - `TreeView`: an ordered array, optionally limited to its first `k`
//!   values
//! - `ValueView`: a single value, typically an aggregate row
//! - `SubscriptionManager`: the callbacks registered on a view
//!
//! # Example
//!
//! ```rust
//! use zql_core::{predicate::Operand, Record};
//! use zql_incremental::Materialite;
//! use zql_index::FieldComparator;
//! use zql_reactive::TreeView;
//!
//! let m = Materialite::new();
//! let issues = m.new_set_source(FieldComparator::by_id());
//! let stream = issues
//!     .stream()
//!     .select(&["id", "n"])
//!     .where_("n", ">", Operand::scalar(100i64))
//!     .unwrap();
//! let view = TreeView::new(&m, &stream, FieldComparator::by_id(), None);
//!
//! view.subscribe(|rows| println!("{} rows", rows.len()));
//! issues.add(Record::new().with("id", "a").with("n", 101i64)).unwrap();
//!
//! assert_eq!(view.len(), 1);
//! ```

pub mod subscription;
pub mod tree_view;
pub mod value_view;

pub use subscription::{ChangeCallback, Subscription, SubscriptionId, SubscriptionManager};
pub use tree_view::{TreeView, TreeViewBuilder};
pub use value_view::ValueView;

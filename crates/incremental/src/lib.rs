//! ZQL Incremental - incremental view maintenance for ZQL queries.
//!
//! Query results are kept up to date by pushing changes through a dataflow
//! graph instead of re-running the query. Every change is a Z-set entry:
//! a value with a signed multiplicity, positive for additions and negative
//! for removals.
//!
//! # Core Concepts
//!
//! - `Multiset<T>`: a lazily evaluated batch of `Entry<T>` changes
//! - `DifferenceStream<T>`: an edge of the graph, carrying one batch per
//!   version to its listeners
//! - Operators: map, filter, distinct, join, reduce, count/sum/average,
//!   branch, concat, effect, debug
//! - Sources: `StatelessSource` forwards writes, `SetSource` also keeps the
//!   current contents in a persistent ordered tree
//! - `Materialite`: groups writes into transactions and drives the
//!   enqueue / notify / commit cycle across sources
//!
//! # Example
//!
//! ```rust
//! use zql_core::{predicate::Operand, Record};
//! use zql_incremental::Materialite;
//! use zql_index::FieldComparator;
//!
//! let m = Materialite::new();
//! let issues = m.new_set_source(FieldComparator::by_id());
//! let open = issues
//!     .stream()
//!     .where_("status", "=", Operand::scalar("open"))
//!     .unwrap()
//!     .count("open");
//!
//! m.tx(|| {
//!     issues.add(Record::new().with("id", "a").with("status", "open"))?;
//!     issues.add(Record::new().with("id", "b").with("status", "closed"))
//! })
//! .unwrap();
//! # drop(open);
//! assert_eq!(issues.len(), 2);
//! ```

pub mod context;
pub mod index;
pub mod materialite;
pub mod message;
pub mod multiset;
pub mod operators;
pub mod record;
pub mod source;
pub mod stream;

pub use context::QueryContext;
pub use index::{Identity, Index};
pub use materialite::Materialite;
pub use message::{PullReply, PullRequest, QueryKind, RequestId, Version};
pub use multiset::{Entry, Multiset};
pub use operators::{IncrementalAvg, IncrementalCount, IncrementalSum, JoinArgs};
pub use record::{Aggregation, JoinSide};
pub use source::{SetSource, SourceId, StatelessSource};
pub use stream::{DifferenceStream, DifferenceStreamListener, ListenerId, Operator};

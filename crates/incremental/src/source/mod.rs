//! Graph roots.
//!
//! - `StatelessSource`: forwards writes at commit and retains nothing
//! - `SetSource`: keeps its contents in a comparator-ordered treap and can
//!   answer pull requests with them
//!
//! Writes outside a transaction open one of their own.

mod set;
mod stateless;

pub use set::SetSource;
pub use stateless::StatelessSource;

use crate::message::Version;
use zql_core::Result;

/// Identifier of a source within its `Materialite`.
pub type SourceId = u64;

/// Commit hooks a `Materialite` drives on every source written in a
/// transaction.
pub(crate) trait SourceInternal {
    fn id(&self) -> SourceId;

    /// Phase 1: push the pending batch onto the stream.
    fn enqueue(&self, version: Version);

    /// Phase 2: run the graph below the stream.
    fn notify(&self, version: Version) -> Result<()>;

    /// Phase 3: commit the stream.
    fn committed(&self, version: Version) -> Result<()>;

    /// Discards everything written since the transaction began.
    fn rollback(&self);
}

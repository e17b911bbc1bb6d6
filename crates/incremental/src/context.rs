//! Query construction context.

use crate::materialite::Materialite;
use crate::record::JoinSide;
use std::cell::Cell;

/// State threaded through the construction of one family of queries: the
/// coordinator their sources belong to and a counter that keeps join
/// aliases of parallel subqueries apart.
#[derive(Debug)]
pub struct QueryContext {
    materialite: Materialite,
    alias_count: Cell<u32>,
}

impl QueryContext {
    /// Creates a context over `materialite`.
    pub fn new(materialite: Materialite) -> Self {
        Self {
            materialite,
            alias_count: Cell::new(0),
        }
    }

    /// The coordinator queries built in this context run under.
    pub fn materialite(&self) -> &Materialite {
        &self.materialite
    }

    /// Returns a fresh alias for `table`, e.g. `issue_0`, `issue_1`.
    pub fn next_alias(&self, table: &str) -> String {
        let n = self.alias_count.get();
        self.alias_count.set(n + 1);
        format!("{table}_{n}")
    }

    /// A join side nesting `table` under a fresh alias, joined on `key`.
    pub fn join_side(&self, table: &str, key: impl Into<String>) -> JoinSide {
        JoinSide::aliased(self.next_alias(table), key)
    }
}

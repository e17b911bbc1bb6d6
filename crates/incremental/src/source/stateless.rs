//! Source without retained contents.

use super::{SourceId, SourceInternal};
use crate::materialite::Materialite;
use crate::message::Version;
use crate::multiset::{Entry, Multiset};
use crate::stream::DifferenceStream;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;
use zql_core::Result;

struct StatelessInner<T> {
    id: SourceId,
    materialite: Materialite,
    stream: DifferenceStream<T>,
    pending: RefCell<Vec<Entry<T>>>,
}

impl<T: Clone + 'static> SourceInternal for StatelessInner<T> {
    fn id(&self) -> SourceId {
        self.id
    }

    fn enqueue(&self, version: Version) {
        let pending = core::mem::take(&mut *self.pending.borrow_mut());
        if !pending.is_empty() {
            trace!(target: "zql::source", source = self.id, version, entries = pending.len(), "enqueue");
            self.stream.new_data(version, Multiset::new(pending), None);
        }
    }

    fn notify(&self, version: Version) -> Result<()> {
        self.stream.notify(version)
    }

    fn committed(&self, version: Version) -> Result<()> {
        self.stream.commit(version)
    }

    fn rollback(&self) {
        self.pending.borrow_mut().clear();
    }
}

/// A source that forwards every write at commit and keeps nothing. It
/// cannot answer pull requests.
pub struct StatelessSource<T> {
    inner: Rc<StatelessInner<T>>,
}

impl<T> Clone for StatelessSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> StatelessSource<T> {
    pub(crate) fn new(materialite: Materialite) -> Self {
        Self {
            inner: Rc::new(StatelessInner {
                id: materialite.next_source_id(),
                materialite,
                stream: DifferenceStream::new(),
                pending: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Identifier of the source.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// The stream the source writes to.
    pub fn stream(&self) -> DifferenceStream<T> {
        self.inner.stream.clone()
    }

    fn stage(&self, entries: impl FnOnce(&mut Vec<Entry<T>>)) -> Result<()> {
        let inner = &self.inner;
        inner.materialite.tx(|| {
            entries(&mut inner.pending.borrow_mut());
            inner.materialite.mark_dirty(Rc::clone(inner) as Rc<dyn SourceInternal>);
            Ok(())
        })
    }

    /// Adds one occurrence of `value`.
    pub fn add(&self, value: T) -> Result<()> {
        self.stage(|pending| pending.push(Entry::insert(value)))
    }

    /// Removes one occurrence of `value`.
    pub fn delete(&self, value: T) -> Result<()> {
        self.stage(|pending| pending.push(Entry::delete(value)))
    }

    /// Adds `values` in a single transaction.
    pub fn seed(&self, values: impl IntoIterator<Item = T>) -> Result<()> {
        self.stage(|pending| pending.extend(values.into_iter().map(Entry::insert)))
    }

    /// Destroys the source's stream and drops pending writes.
    pub fn destroy(&self) {
        self.inner.pending.borrow_mut().clear();
        self.inner.stream.destroy();
    }
}

//! Transaction and version coordinator.
//!
//! A `Materialite` owns the version counter of one dataflow graph and the
//! set of sources written since the last commit. Commit runs in three
//! phases so that multi-input operators see all of their inputs for a
//! version before any of them runs, and application callbacks fire only
//! once the whole graph has settled:
//!
//! 1. every dirty source enqueues its pending batch on its stream
//! 2. every dirty source notifies its stream, running the graph
//! 3. every dirty source commits its stream, reaching views last

use crate::message::{RequestId, Version};
use crate::source::{SetSource, SourceId, SourceInternal, StatelessSource};
use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, warn};
use zql_core::{Error, Result};
use zql_index::{Comparator, DynComparator};

struct MaterialiteInner {
    version: Cell<Version>,
    in_tx: Cell<bool>,
    dirty: RefCell<Vec<Rc<dyn SourceInternal>>>,
    next_source_id: Cell<SourceId>,
    next_request_id: Cell<RequestId>,
}

/// Version/transaction coordinator for one dataflow graph.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct Materialite {
    inner: Rc<MaterialiteInner>,
}

impl Default for Materialite {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks a transaction body as running until dropped. A body that unwinds
/// rolls its writes back.
struct TxBody<'a> {
    materialite: &'a Materialite,
    version: Version,
}

impl<'a> TxBody<'a> {
    fn enter(materialite: &'a Materialite, version: Version) -> Self {
        materialite.inner.in_tx.set(true);
        Self { materialite, version }
    }
}

impl Drop for TxBody<'_> {
    fn drop(&mut self) {
        self.materialite.inner.in_tx.set(false);
        if std::thread::panicking() {
            self.materialite.rollback(self.version);
        }
    }
}

impl Materialite {
    /// Creates a coordinator at version 0.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MaterialiteInner {
                version: Cell::new(0),
                in_tx: Cell::new(false),
                dirty: RefCell::new(Vec::new()),
                next_source_id: Cell::new(0),
                next_request_id: Cell::new(0),
            }),
        }
    }

    /// Version of the last committed transaction.
    #[inline]
    pub fn version(&self) -> Version {
        self.inner.version.get()
    }

    /// Returns true while a transaction body is running.
    #[inline]
    pub fn in_transaction(&self) -> bool {
        self.inner.in_tx.get()
    }

    /// Runs `f` in a transaction.
    ///
    /// Outside a transaction this opens version `version() + 1`, runs `f`
    /// and commits on success. If `f` fails, every source written during
    /// the transaction discards its changes and the error is returned.
    /// Inside a transaction `f` simply runs; only the outermost call commits
    /// or rolls back.
    ///
    /// The body flag is cleared before commit starts, so a write made by a
    /// commit listener (a view callback, say) runs as its own transaction
    /// at the following version.
    pub fn tx<R, E, F>(&self, f: F) -> core::result::Result<R, E>
    where
        F: FnOnce() -> core::result::Result<R, E>,
        E: From<Error>,
    {
        if self.inner.in_tx.get() {
            return f();
        }
        let version = self.inner.version.get() + 1;
        debug!(target: "zql::materialite", version, "transaction started");

        let result = {
            let _body = TxBody::enter(self, version);
            f()
        };

        match result {
            Ok(value) => {
                self.commit(version)?;
                Ok(value)
            }
            Err(err) => {
                self.rollback(version);
                Err(err)
            }
        }
    }

    fn commit(&self, version: Version) -> Result<()> {
        let sources = core::mem::take(&mut *self.inner.dirty.borrow_mut());
        self.inner.version.set(version);
        for source in &sources {
            source.enqueue(version);
        }
        for source in &sources {
            source.notify(version)?;
        }
        for source in &sources {
            source.committed(version)?;
        }
        debug!(
            target: "zql::materialite",
            version,
            sources = sources.len(),
            "transaction committed"
        );
        Ok(())
    }

    fn rollback(&self, version: Version) {
        let sources = core::mem::take(&mut *self.inner.dirty.borrow_mut());
        for source in &sources {
            source.rollback();
        }
        warn!(
            target: "zql::materialite",
            version,
            sources = sources.len(),
            "transaction rolled back"
        );
    }

    /// Records `source` as written in the current transaction.
    pub(crate) fn mark_dirty(&self, source: Rc<dyn SourceInternal>) {
        let mut dirty = self.inner.dirty.borrow_mut();
        if !dirty.iter().any(|s| s.id() == source.id()) {
            dirty.push(source);
        }
    }

    pub(crate) fn next_source_id(&self) -> SourceId {
        let id = self.inner.next_source_id.get();
        self.inner.next_source_id.set(id + 1);
        id
    }

    /// Allocates a pull request id.
    pub fn next_request_id(&self) -> RequestId {
        let id = self.inner.next_request_id.get();
        self.inner.next_request_id.set(id + 1);
        id
    }

    /// Creates a source that forwards writes without retaining them.
    pub fn new_stateless_source<T: Clone + 'static>(&self) -> StatelessSource<T> {
        StatelessSource::new(self.clone())
    }

    /// Creates a source that keeps its contents ordered by `comparator`.
    pub fn new_set_source<T: Clone + 'static>(&self, comparator: impl Comparator<T> + 'static) -> SetSource<T> {
        SetSource::new(self.clone(), Rc::new(comparator))
    }

    /// Creates a set source sharing an existing comparator.
    pub fn new_set_source_with<T: Clone + 'static>(&self, comparator: DynComparator<T>) -> SetSource<T> {
        SetSource::new(self.clone(), comparator)
    }
}

impl fmt::Debug for Materialite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materialite")
            .field("version", &self.inner.version.get())
            .field("in_tx", &self.inner.in_tx.get())
            .field("dirty", &self.inner.dirty.borrow().len())
            .finish()
    }
}

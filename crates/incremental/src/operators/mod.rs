//! Dataflow operators.
//!
//! This module provides the operators that can be wired between streams:
//! - Linear: map, filter, distinct (stateless per batch)
//! - Effect / debug: observe batches and pass them through
//! - Join: binary, keeps an index of each side's history
//! - Reduce: per-group recompute over live members
//! - Aggregate: whole-stream count, sum and average over records
//! - Branch / concat: fan-out and fan-in
//!
//! Every operator reads its inputs through a `Reader` registered as a
//! listener on the input stream, and writes into exactly one output stream
//! (several for branch) that owns it.

mod aggregate;
mod branch;
mod concat;
mod effect;
mod join;
mod linear;
mod reduce;
mod unary;

pub use aggregate::{IncrementalAvg, IncrementalCount, IncrementalSum};
pub use join::JoinArgs;

pub(crate) use unary::UnaryOperator;

use crate::message::{PullReply, PullRequest, Version};
use crate::multiset::Multiset;
use crate::stream::{DifferenceStream, DifferenceStreamListener, ListenerId, Operator};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use zql_core::{Error, Result};

/// A batch waiting in a reader's queue.
pub(crate) struct Batch<T> {
    pub(crate) version: Version,
    pub(crate) data: Multiset<T>,
    pub(crate) reply: Option<PullReply>,
}

/// Queues the batches a stream sends to one operator input and forwards
/// `run`/`commit` to that operator.
pub(crate) struct Reader<T> {
    queue: RefCell<VecDeque<Batch<T>>>,
    operator: Weak<dyn Operator>,
}

impl<T> DifferenceStreamListener<T> for Reader<T> {
    fn new_difference(&self, version: Version, data: Multiset<T>, reply: Option<PullReply>) {
        self.queue.borrow_mut().push_back(Batch {
            version,
            data,
            reply,
        });
    }

    fn run(&self, version: Version) -> Result<()> {
        let operator = self.operator.upgrade().ok_or(Error::ReaderDetached)?;
        operator.run(version)
    }

    fn commit(&self, version: Version) -> Result<()> {
        match self.operator.upgrade() {
            Some(operator) => operator.commit(version),
            None => Ok(()),
        }
    }
}

/// One input of an operator: the stream, the reader registered on it and
/// the reader's listener handle.
pub(crate) struct Input<T> {
    stream: DifferenceStream<T>,
    reader: Rc<Reader<T>>,
    id: ListenerId,
}

impl<T: Clone + 'static> Input<T> {
    /// Registers a reader for `operator` on `stream`.
    pub(crate) fn connect(stream: &DifferenceStream<T>, operator: Weak<dyn Operator>) -> Self {
        let reader = Rc::new(Reader {
            queue: RefCell::new(VecDeque::new()),
            operator,
        });
        let listener: Rc<dyn DifferenceStreamListener<T>> = reader.clone();
        let id = stream.add_listener(Rc::downgrade(&listener));
        Self {
            stream: stream.clone(),
            reader,
            id,
        }
    }

    /// Takes every queued batch, oldest first.
    pub(crate) fn drain(&self) -> Vec<Batch<T>> {
        self.reader.queue.borrow_mut().drain(..).collect()
    }

    pub(crate) fn message_upstream(&self, request: &PullRequest) -> Result<bool> {
        self.stream.message_upstream(request, self.id)
    }

    /// Unregisters the reader, cascading upstream if it was the stream's
    /// last listener.
    pub(crate) fn disconnect(&self) {
        self.reader.queue.borrow_mut().clear();
        self.stream.remove_listener(self.id);
    }
}

/// Rejects versions that go backwards and lets a commit through once per
/// version.
#[derive(Default)]
pub(crate) struct VersionGuard {
    last_run: Cell<Option<Version>>,
    last_commit: Cell<Option<Version>>,
}

impl VersionGuard {
    pub(crate) fn check_run(&self, version: Version) -> Result<()> {
        if let Some(last) = self.last_run.get() {
            if version < last {
                return Err(Error::VersionOutOfOrder { last, got: version });
            }
        }
        self.last_run.set(Some(version));
        Ok(())
    }

    /// Returns true the first time it sees `version`.
    pub(crate) fn first_commit(&self, version: Version) -> bool {
        if self.last_commit.get() == Some(version) {
            return false;
        }
        self.last_commit.set(Some(version));
        true
    }
}

//! Source backed by an ordered treap.

use super::{SourceId, SourceInternal};
use crate::materialite::Materialite;
use crate::message::{PullReply, PullRequest, Version};
use crate::multiset::{Entry, Multiset};
use crate::stream::{DifferenceStream, PullHandler};
use core::fmt;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;
use zql_core::{Error, Result};
use zql_index::{Comparator, DynComparator, Treap};

struct SetInner<T> {
    id: SourceId,
    me: Weak<SetInner<T>>,
    materialite: Materialite,
    stream: DifferenceStream<T>,
    tree: RefCell<Treap<T>>,
    pending: RefCell<Vec<Entry<T>>>,
    replies: RefCell<Vec<PullReply>>,
    /// Tree as of the first write of the open transaction.
    snapshot: RefCell<Option<Treap<T>>>,
}

impl<T: Clone + 'static> SetInner<T> {
    /// Must run inside a transaction, before the first change to `tree`.
    fn begin_write(&self) {
        let mut snapshot = self.snapshot.borrow_mut();
        if snapshot.is_none() {
            *snapshot = Some(self.tree.borrow().clone());
        }
        drop(snapshot);
        if let Some(me) = self.me.upgrade() {
            self.materialite.mark_dirty(me);
        }
    }

    fn write(&self, f: impl FnOnce(&mut Treap<T>, &mut Vec<Entry<T>>)) -> Result<()> {
        self.materialite.tx(|| {
            self.begin_write();
            f(&mut self.tree.borrow_mut(), &mut self.pending.borrow_mut());
            Ok(())
        })
    }
}

impl<T: Clone + 'static> SourceInternal for SetInner<T> {
    fn id(&self) -> SourceId {
        self.id
    }

    fn enqueue(&self, version: Version) {
        self.snapshot.borrow_mut().take();
        let pending = core::mem::take(&mut *self.pending.borrow_mut());
        let replies = core::mem::take(&mut *self.replies.borrow_mut());

        if !replies.is_empty() {
            // Requesters also receive this version's pending batch, so the
            // reply carries the tree minus those changes.
            let contents = Multiset::inserts(self.tree.borrow().to_vec())
                .concat(&Multiset::new(pending.clone()).negate());
            for reply in replies {
                trace!(target: "zql::source", source = self.id, version, request = reply.replying_to, "answering pull");
                self.stream.new_data(version, contents.clone(), Some(reply));
            }
        }
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
        self.replies.borrow_mut().clear();
        if let Some(snapshot) = self.snapshot.borrow_mut().take() {
            *self.tree.borrow_mut() = snapshot;
        }
    }
}

impl<T: Clone + 'static> PullHandler for SetInner<T> {
    fn on_pull(&self, request: &PullRequest) -> Result<bool> {
        trace!(target: "zql::source", source = self.id, request = request.id, "pull requested");
        self.materialite.tx(|| {
            self.begin_write();
            self.replies.borrow_mut().push(request.reply());
            Ok::<_, Error>(())
        })?;
        Ok(true)
    }
}

/// A source that keeps its net contents ordered by a comparator.
///
/// Values comparing equal are the same element: adding one replaces the
/// other. Pull requests are answered with the full contents.
pub struct SetSource<T> {
    inner: Rc<SetInner<T>>,
}

impl<T> Clone for SetSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> SetSource<T> {
    pub(crate) fn new(materialite: Materialite, comparator: DynComparator<T>) -> Self {
        let id = materialite.next_source_id();
        let inner = Rc::new_cyclic(|me: &Weak<SetInner<T>>| {
            let root: Weak<dyn PullHandler> = me.clone();
            SetInner {
                id,
                me: me.clone(),
                materialite,
                stream: DifferenceStream::with_root(root),
                tree: RefCell::new(Treap::with_comparator(comparator)),
                pending: RefCell::new(Vec::new()),
                replies: RefCell::new(Vec::new()),
                snapshot: RefCell::new(None),
            }
        });
        Self { inner }
    }

    /// Identifier of the source.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// The stream the source writes to.
    pub fn stream(&self) -> DifferenceStream<T> {
        self.inner.stream.clone()
    }

    /// The comparator ordering the contents.
    pub fn comparator(&self) -> DynComparator<T> {
        self.inner.tree.borrow().comparator()
    }

    /// Adds `value`. An equal value already present is replaced, and its
    /// retraction is emitted ahead of the insert.
    pub fn add(&self, value: T) -> Result<()> {
        self.inner.write(|tree, pending| {
            if let Some(replaced) = tree.insert(value.clone()) {
                pending.push(Entry::delete(replaced));
            }
            pending.push(Entry::insert(value));
        })
    }

    /// Removes the value equal to `value`. The stored value is what gets
    /// retracted; deleting an absent value changes nothing.
    pub fn delete(&self, value: T) -> Result<()> {
        self.inner.write(|tree, pending| {
            if let Some(stored) = tree.remove(&value) {
                pending.push(Entry::delete(stored));
            }
        })
    }

    /// Loads `values` as the starting contents. Nothing is pushed
    /// downstream; views obtain seeded contents by pulling.
    pub fn seed(&self, values: impl IntoIterator<Item = T>) -> Result<()> {
        self.inner.write(|tree, _| {
            for value in values {
                tree.insert(value);
            }
        })
    }

    /// Returns the stored value equal to `key`.
    pub fn get(&self, key: &T) -> Option<T> {
        self.inner.tree.borrow().get(key).cloned()
    }

    /// Like `get`, but a missing value is an error.
    pub fn require(&self, key: &T) -> Result<T>
    where
        T: fmt::Debug,
    {
        self.get(key)
            .ok_or_else(|| Error::KeyNotFound(format!("{key:?}")))
    }

    /// The contents in comparator order.
    pub fn values(&self) -> Vec<T> {
        self.inner.tree.borrow().to_vec()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.inner.tree.borrow().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.tree.borrow().is_empty()
    }

    /// Creates an independent source ordered by `comparator`, seeded with
    /// the current contents. Later writes to `self` are not mirrored.
    pub fn with_new_ordering(&self, comparator: impl Comparator<T> + 'static) -> Result<SetSource<T>> {
        let source = self.inner.materialite.new_set_source(comparator);
        source.seed(self.values())?;
        Ok(source)
    }

    /// Destroys the source's stream and drops uncommitted writes.
    pub fn destroy(&self) {
        self.inner.pending.borrow_mut().clear();
        self.inner.replies.borrow_mut().clear();
        self.inner.stream.destroy();
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for SetSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetSource")
            .field("id", &self.inner.id)
            .field("values", &*self.inner.tree.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::tests::Recorder;
    use zql_core::Record;
    use zql_index::{FieldComparator, Order, SimpleComparator};

    fn rec(id: &str, n: i64) -> Record {
        Record::new().with("id", id).with("n", n)
    }

    #[test]
    fn test_add_and_delete_update_tree_and_stream() {
        let m = Materialite::new();
        let source = m.new_set_source::<i64>(SimpleComparator::asc());
        let (rec, _) = Recorder::attach(&source.stream());

        source.add(3).unwrap();
        source.add(1).unwrap();
        source.delete(3).unwrap();
        source.delete(42).unwrap();

        assert_eq!(source.values(), vec![1]);
        assert_eq!(
            rec.entries(),
            vec![Entry::insert(3), Entry::insert(1), Entry::delete(3)]
        );
    }

    #[test]
    fn test_delete_then_add_is_replace() {
        let m = Materialite::new();
        let source = m.new_set_source(FieldComparator::by_id());
        source.add(rec("a", 1)).unwrap();
        m.tx(|| {
            source.delete(rec("a", 1))?;
            source.add(rec("a", 2))
        })
        .unwrap();
        assert_eq!(source.len(), 1);
        let stored = source.require(&Record::new().with("id", "a")).unwrap();
        assert_eq!(stored.get("n").and_then(|v| v.as_i64()), Some(2));
    }

    #[test]
    fn test_add_over_existing_retracts_it() {
        let m = Materialite::new();
        let source = m.new_set_source(FieldComparator::by_id());
        let (recorder, _) = Recorder::attach(&source.stream());
        source.add(rec("a", 1)).unwrap();
        source.add(rec("a", 2)).unwrap();
        assert_eq!(source.values(), vec![rec("a", 2)]);
        assert_eq!(
            recorder.entries(),
            vec![
                Entry::insert(rec("a", 1)),
                Entry::delete(rec("a", 1)),
                Entry::insert(rec("a", 2)),
            ]
        );
    }

    #[test]
    fn test_delete_retracts_stored_value() {
        let m = Materialite::new();
        let source = m.new_set_source(FieldComparator::by_id());
        let (recorder, _) = Recorder::attach(&source.stream());
        source.add(rec("a", 1)).unwrap();
        source.delete(Record::new().with("id", "a")).unwrap();
        assert_eq!(recorder.entries().last(), Some(&Entry::delete(rec("a", 1))));
    }

    #[test]
    fn test_require_missing_key() {
        let m = Materialite::new();
        let source = m.new_set_source::<i64>(SimpleComparator::asc());
        assert_eq!(source.require(&7), Err(Error::KeyNotFound("7".into())));
    }

    #[test]
    fn test_seed_does_not_emit() {
        let m = Materialite::new();
        let source = m.new_set_source::<i64>(SimpleComparator::asc());
        let (rec, _) = Recorder::attach(&source.stream());
        source.seed(vec![3, 1, 2]).unwrap();
        assert_eq!(source.values(), vec![1, 2, 3]);
        assert!(rec.entries().is_empty());
    }

    #[test]
    fn test_pull_replies_with_contents_to_requestor_only() {
        let m = Materialite::new();
        let source = m.new_set_source::<i64>(SimpleComparator::asc());
        source.seed(vec![2, 1]).unwrap();
        let stream = source.stream();
        let (asker, asker_id) = Recorder::attach(&stream);
        let (other, _) = Recorder::attach(&stream);

        assert!(stream.message_upstream(&PullRequest::new(5), asker_id).unwrap());

        assert_eq!(asker.entries(), vec![Entry::insert(1), Entry::insert(2)]);
        assert_eq!(asker.batches.borrow()[0].2, Some(PullReply { replying_to: 5 }));
        assert!(other.entries().is_empty());
        assert!(other.commits.borrow().is_empty());
        assert_eq!(stream.requestor_count(), 0);
    }

    #[test]
    fn test_concurrent_pulls_each_get_one_reply() {
        let m = Materialite::new();
        let source = m.new_set_source::<i64>(SimpleComparator::asc());
        source.seed(vec![1, 2]).unwrap();
        let stream = source.stream();
        let (a, a_id) = Recorder::attach(&stream);
        let (b, b_id) = Recorder::attach(&stream);

        m.tx(|| {
            stream.message_upstream(&PullRequest::new(10), a_id)?;
            stream.message_upstream(&PullRequest::new(11), b_id)
        })
        .unwrap();

        assert_eq!(a.entries(), vec![Entry::insert(1), Entry::insert(2)]);
        assert_eq!(b.entries(), vec![Entry::insert(1), Entry::insert(2)]);
        assert_eq!(a.batches.borrow()[0].2, Some(PullReply { replying_to: 10 }));
        assert_eq!(b.batches.borrow()[0].2, Some(PullReply { replying_to: 11 }));
        assert_eq!(stream.requestor_count(), 0);
    }

    #[test]
    fn test_pull_inside_writing_tx_is_not_double_counted() {
        let m = Materialite::new();
        let source = m.new_set_source::<i64>(SimpleComparator::asc());
        source.add(1).unwrap();
        let stream = source.stream();
        let (asker, id) = Recorder::attach(&stream);

        m.tx(|| {
            source.add(2)?;
            stream.message_upstream(&PullRequest::new(0), id)?;
            Ok::<_, Error>(())
        })
        .unwrap();

        let net = Multiset::new(asker.entries()).consolidate();
        assert_eq!(net, vec![Entry::insert(1), Entry::insert(2)]);
    }

    #[test]
    fn test_with_new_ordering_is_a_snapshot() {
        let m = Materialite::new();
        let source = m.new_set_source(FieldComparator::by_id());
        source.add(rec("a", 2)).unwrap();
        source.add(rec("b", 1)).unwrap();

        let by_n = source
            .with_new_ordering(FieldComparator::new([("n", Order::Asc)]))
            .unwrap();
        let ids: Vec<String> = by_n.values().iter().map(|r| r.identity()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        source.add(rec("c", 0)).unwrap();
        assert_eq!(by_n.len(), 2);
    }

    #[test]
    fn test_rollback_restores_tree() {
        let m = Materialite::new();
        let source = m.new_set_source::<i64>(SimpleComparator::asc());
        source.seed(vec![1, 2]).unwrap();
        let result = m.tx(|| {
            source.add(3)?;
            source.delete(1)?;
            Err::<(), _>(Error::aborted("rollback"))
        });
        assert!(result.is_err());
        assert_eq!(source.values(), vec![1, 2]);
    }
}

//! Difference streams and the listener protocol.
//!
//! A stream is an edge of the dataflow graph. Ownership runs from the
//! sinks back to the sources:
//!
//! - a stream owns its upstream operator
//! - an operator owns its input streams and the readers it registered on them
//! - a stream only holds weak handles to its listeners, addressed by slot
//!
//! Dropping or destroying the last consumer of a branch therefore releases
//! the whole branch up to the nearest fork that still has other listeners.

use crate::message::{PullReply, PullRequest, RequestId, Version};
use crate::multiset::Multiset;
use core::fmt;
use hashbrown::{HashMap, HashSet};
use slab::Slab;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;
use zql_core::{Error, Result};

/// Handle of a listener registered on a stream.
pub type ListenerId = usize;

/// A consumer of a stream: operator readers and views.
pub trait DifferenceStreamListener<T> {
    /// Enqueues a batch for `version`. Called before `run`.
    fn new_difference(&self, version: Version, data: Multiset<T>, reply: Option<PullReply>);

    /// Processes everything enqueued so far.
    fn run(&self, version: Version) -> Result<()>;

    /// Signals that `version` is fully propagated.
    fn commit(&self, version: Version) -> Result<()>;
}

/// An operator writing into a stream.
///
/// The stream an operator writes to owns it; `destroy` detaches the operator
/// from its inputs.
pub trait Operator {
    /// Drains the operator's inputs and pushes results downstream.
    fn run(&self, version: Version) -> Result<()>;

    /// Forwards the commit of `version` downstream.
    fn commit(&self, version: Version) -> Result<()>;

    /// Forwards a pull request to the operator's inputs. Returns true if some
    /// source accepted it.
    fn message_upstream(&self, request: &PullRequest) -> Result<bool>;

    /// Detaches the operator from its inputs.
    fn destroy(&self);
}

/// A graph root able to answer pull requests.
pub(crate) trait PullHandler {
    fn on_pull(&self, request: &PullRequest) -> Result<bool>;
}

struct StreamState<T> {
    listeners: Slab<Weak<dyn DifferenceStreamListener<T>>>,
    /// Listeners owed a reply, with the ids of their open requests.
    requestors: HashMap<ListenerId, HashSet<RequestId>>,
    /// Set once an untagged batch has gone out since the last commit.
    broadcast: bool,
    upstream: Option<Rc<dyn Operator>>,
    root: Option<Weak<dyn PullHandler>>,
}

/// A typed, fan-out edge of the dataflow graph carrying versioned batches.
///
/// Cloning yields another handle to the same stream.
pub struct DifferenceStream<T> {
    state: Rc<RefCell<StreamState<T>>>,
}

impl<T> Clone for DifferenceStream<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

/// Non-owning handle to a stream, held by the operator writing into it.
pub(crate) struct WeakStream<T> {
    state: Weak<RefCell<StreamState<T>>>,
}

impl<T> WeakStream<T> {
    pub(crate) fn upgrade(&self) -> Option<DifferenceStream<T>> {
        self.state.upgrade().map(|state| DifferenceStream { state })
    }
}

impl<T: Clone + 'static> Default for DifferenceStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> DifferenceStream<T> {
    /// Creates a stream with no upstream and no listeners.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(StreamState {
                listeners: Slab::new(),
                requestors: HashMap::new(),
                broadcast: false,
                upstream: None,
                root: None,
            })),
        }
    }

    /// Installs the upstream of a stream freshly created by an operator
    /// builder.
    pub(crate) fn adopt(&self, operator: Rc<dyn Operator>) {
        let mut state = self.state.borrow_mut();
        debug_assert!(state.upstream.is_none());
        state.upstream = Some(operator);
    }

    /// Creates a stream whose pull requests end at `root`.
    pub(crate) fn with_root(root: Weak<dyn PullHandler>) -> Self {
        let stream = Self::new();
        stream.state.borrow_mut().root = Some(root);
        stream
    }

    pub(crate) fn downgrade(&self) -> WeakStream<T> {
        WeakStream {
            state: Rc::downgrade(&self.state),
        }
    }

    /// Makes `operator` the stream's upstream. A stream has at most one.
    pub fn set_upstream(&self, operator: Rc<dyn Operator>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.upstream.is_some() {
            return Err(Error::UpstreamAlreadySet);
        }
        state.upstream = Some(operator);
        Ok(())
    }

    /// Returns true if some operator writes into this stream.
    pub fn has_upstream(&self) -> bool {
        self.state.borrow().upstream.is_some()
    }

    /// Registers a listener and returns its handle.
    pub fn add_listener(&self, listener: Weak<dyn DifferenceStreamListener<T>>) -> ListenerId {
        self.state.borrow_mut().listeners.insert(listener)
    }

    /// Unregisters a listener. Removing the last live listener destroys the
    /// stream, which in turn detaches its upstream operator.
    pub fn remove_listener(&self, id: ListenerId) {
        let now_unused = {
            let mut state = self.state.borrow_mut();
            if !state.listeners.contains(id) {
                return;
            }
            state.listeners.remove(id);
            state.requestors.remove(&id);
            state.listeners.iter().all(|(_, l)| l.strong_count() == 0)
        };
        if now_unused {
            self.destroy();
        }
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.state
            .borrow()
            .listeners
            .iter()
            .filter(|(_, l)| l.strong_count() > 0)
            .count()
    }

    /// Number of listeners owed a pull reply.
    pub fn requestor_count(&self) -> usize {
        self.state.borrow().requestors.len()
    }

    /// Returns true if both handles refer to the same stream.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Collects live listeners, restricted to `only` when given, pruning
    /// slots whose listener has been dropped.
    fn live_listeners(
        &self,
        only: Option<&HashSet<ListenerId>>,
    ) -> Vec<Rc<dyn DifferenceStreamListener<T>>> {
        let mut state = self.state.borrow_mut();
        let mut live = Vec::new();
        let mut dead = Vec::new();
        for (id, listener) in state.listeners.iter() {
            if only.is_some_and(|set| !set.contains(&id)) {
                continue;
            }
            match listener.upgrade() {
                Some(listener) => live.push(listener),
                None => dead.push(id),
            }
        }
        for id in dead {
            state.listeners.remove(id);
            state.requestors.remove(&id);
        }
        live
    }

    /// Pushes a batch downstream. A batch tagged with `reply` goes only to
    /// the listeners that sent the matching request; others are broadcast.
    pub fn new_data(&self, version: Version, data: Multiset<T>, reply: Option<PullReply>) {
        let targets = match reply {
            Some(reply) => {
                let askers: HashSet<ListenerId> = self
                    .state
                    .borrow()
                    .requestors
                    .iter()
                    .filter(|(_, requests)| requests.contains(&reply.replying_to))
                    .map(|(id, _)| *id)
                    .collect();
                self.live_listeners(Some(&askers))
            }
            None => {
                self.state.borrow_mut().broadcast = true;
                self.live_listeners(None)
            }
        };
        for listener in targets {
            listener.new_difference(version, data.clone(), reply);
        }
    }

    /// Tells every listener to process what it has enqueued.
    pub fn notify(&self, version: Version) -> Result<()> {
        for listener in self.live_listeners(None) {
            listener.run(version)?;
        }
        Ok(())
    }

    /// Signals that `version` is committed. Requestors are cleared before
    /// any listener runs. When only replies went out since the last commit,
    /// the commit reaches the requestors alone; otherwise it is broadcast.
    pub fn commit(&self, version: Version) -> Result<()> {
        let (requestors, broadcast) = {
            let mut state = self.state.borrow_mut();
            let requestors: HashSet<ListenerId> = state.requestors.drain().map(|(id, _)| id).collect();
            (requestors, core::mem::take(&mut state.broadcast))
        };
        let targets = if requestors.is_empty() || broadcast {
            self.live_listeners(None)
        } else {
            self.live_listeners(Some(&requestors))
        };
        for listener in targets {
            listener.commit(version)?;
        }
        Ok(())
    }

    /// Records `from` as owed a reply and forwards `request` upstream.
    /// Returns true if a source accepted the request; otherwise `from` is not
    /// left waiting.
    pub fn message_upstream(&self, request: &PullRequest, from: ListenerId) -> Result<bool> {
        let (upstream, root, newly_recorded) = {
            let mut state = self.state.borrow_mut();
            let newly_recorded = state.requestors.entry(from).or_default().insert(request.id);
            (state.upstream.clone(), state.root.clone(), newly_recorded)
        };
        let result = match (upstream, root.and_then(|r| r.upgrade())) {
            (Some(operator), _) => operator.message_upstream(request),
            (None, Some(root)) => root.on_pull(request),
            (None, None) => {
                trace!(target: "zql::stream", request = request.id, "pull reached a root that cannot answer");
                Ok(false)
            }
        };
        if newly_recorded && !matches!(result, Ok(true)) {
            let mut state = self.state.borrow_mut();
            if let Some(requests) = state.requestors.get_mut(&from) {
                requests.remove(&request.id);
                if requests.is_empty() {
                    state.requestors.remove(&from);
                }
            }
        }
        result
    }

    /// Tears down the upstream operator and forgets every listener.
    pub fn destroy(&self) {
        let upstream = {
            let mut state = self.state.borrow_mut();
            state.listeners.clear();
            state.requestors.clear();
            state.broadcast = false;
            state.upstream.take()
        };
        if let Some(operator) = upstream {
            operator.destroy();
        }
    }
}

impl<T> fmt::Debug for DifferenceStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("DifferenceStream")
            .field("listeners", &state.listeners.len())
            .field("requestors", &state.requestors.len())
            .field("has_upstream", &state.upstream.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::multiset::Entry;
    use std::cell::Cell;

    /// Listener that records everything it is sent.
    pub(crate) struct Recorder<T> {
        pub(crate) batches: RefCell<Vec<(Version, Vec<Entry<T>>, Option<PullReply>)>>,
        pub(crate) runs: RefCell<Vec<Version>>,
        pub(crate) commits: RefCell<Vec<Version>>,
    }

    impl<T: Clone + 'static> Recorder<T> {
        pub(crate) fn attach(stream: &DifferenceStream<T>) -> (Rc<Self>, ListenerId) {
            let recorder = Rc::new(Self {
                batches: RefCell::new(Vec::new()),
                runs: RefCell::new(Vec::new()),
                commits: RefCell::new(Vec::new()),
            });
            let listener: Rc<dyn DifferenceStreamListener<T>> = recorder.clone();
            let id = stream.add_listener(Rc::downgrade(&listener));
            (recorder, id)
        }

        pub(crate) fn entries(&self) -> Vec<Entry<T>> {
            self.batches
                .borrow()
                .iter()
                .flat_map(|(_, entries, _)| entries.clone())
                .collect()
        }
    }

    impl<T: Clone + 'static> DifferenceStreamListener<T> for Recorder<T> {
        fn new_difference(&self, version: Version, data: Multiset<T>, reply: Option<PullReply>) {
            self.batches.borrow_mut().push((version, data.to_vec(), reply));
        }

        fn run(&self, version: Version) -> Result<()> {
            self.runs.borrow_mut().push(version);
            Ok(())
        }

        fn commit(&self, version: Version) -> Result<()> {
            self.commits.borrow_mut().push(version);
            Ok(())
        }
    }

    /// Upstream that accepts every pull and does nothing else.
    pub(crate) struct NoopOperator {
        pub(crate) destroyed: Cell<bool>,
    }

    impl NoopOperator {
        pub(crate) fn new() -> Rc<Self> {
            Rc::new(Self {
                destroyed: Cell::new(false),
            })
        }
    }

    impl Operator for NoopOperator {
        fn run(&self, _version: Version) -> Result<()> {
            Ok(())
        }

        fn commit(&self, _version: Version) -> Result<()> {
            Ok(())
        }

        fn message_upstream(&self, _request: &PullRequest) -> Result<bool> {
            Ok(true)
        }

        fn destroy(&self) {
            self.destroyed.set(true);
        }
    }

    #[test]
    fn test_broadcast() {
        let stream = DifferenceStream::<i64>::new();
        let (a, _) = Recorder::attach(&stream);
        let (b, _) = Recorder::attach(&stream);

        stream.new_data(1, Multiset::inserts(vec![1, 2]), None);
        stream.notify(1).unwrap();
        stream.commit(1).unwrap();

        for r in [&a, &b] {
            assert_eq!(r.entries().len(), 2);
            assert_eq!(*r.runs.borrow(), vec![1]);
            assert_eq!(*r.commits.borrow(), vec![1]);
        }
    }

    #[test]
    fn test_reply_goes_only_to_requestor() {
        let stream = DifferenceStream::<i64>::new();
        let upstream = Rc::new(NoopOperator {
            destroyed: Cell::new(false),
        });
        stream.set_upstream(upstream).unwrap();
        let (asker, asker_id) = Recorder::attach(&stream);
        let (other, _) = Recorder::attach(&stream);

        let request = PullRequest::new(9);
        assert!(stream.message_upstream(&request, asker_id).unwrap());
        assert_eq!(stream.requestor_count(), 1);

        stream.new_data(1, Multiset::inserts(vec![5]), Some(request.reply()));
        stream.commit(1).unwrap();
        assert_eq!(asker.entries(), vec![Entry::insert(5)]);
        assert!(other.entries().is_empty());
        assert_eq!(*asker.commits.borrow(), vec![1]);
        assert!(other.commits.borrow().is_empty());

        // Requestors were cleared; the next commit is broadcast.
        assert_eq!(stream.requestor_count(), 0);
        stream.commit(2).unwrap();
        assert_eq!(*other.commits.borrow(), vec![2]);
    }

    #[test]
    fn test_unanswered_pull_does_not_capture_commits() {
        let stream = DifferenceStream::<i64>::new();
        let (asker, id) = Recorder::attach(&stream);
        let (other, _) = Recorder::attach(&stream);
        assert!(!stream.message_upstream(&PullRequest::new(1), id).unwrap());
        stream.commit(1).unwrap();
        assert_eq!(*asker.commits.borrow(), vec![1]);
        assert_eq!(*other.commits.borrow(), vec![1]);
    }

    #[test]
    fn test_reply_routed_by_request_id() {
        let stream = DifferenceStream::<i64>::new();
        stream.set_upstream(NoopOperator::new()).unwrap();
        let (a, a_id) = Recorder::attach(&stream);
        let (b, b_id) = Recorder::attach(&stream);
        let first = PullRequest::new(10);
        let second = PullRequest::new(11);
        assert!(stream.message_upstream(&first, a_id).unwrap());
        assert!(stream.message_upstream(&second, b_id).unwrap());

        stream.new_data(1, Multiset::inserts(vec![1]), Some(first.reply()));
        stream.new_data(1, Multiset::inserts(vec![2]), Some(second.reply()));
        assert_eq!(*a.batches.borrow(), vec![(1, vec![Entry::insert(1)], Some(first.reply()))]);
        assert_eq!(*b.batches.borrow(), vec![(1, vec![Entry::insert(2)], Some(second.reply()))]);
    }

    #[test]
    fn test_commit_broadcast_after_live_data() {
        let stream = DifferenceStream::<i64>::new();
        stream.set_upstream(NoopOperator::new()).unwrap();
        let (asker, asker_id) = Recorder::attach(&stream);
        let (other, _) = Recorder::attach(&stream);
        let request = PullRequest::new(3);
        assert!(stream.message_upstream(&request, asker_id).unwrap());

        stream.new_data(1, Multiset::inserts(vec![1]), Some(request.reply()));
        stream.new_data(1, Multiset::inserts(vec![2]), None);
        stream.commit(1).unwrap();
        assert_eq!(*asker.commits.borrow(), vec![1]);
        assert_eq!(*other.commits.borrow(), vec![1]);
        assert_eq!(other.entries(), vec![Entry::insert(2)]);
    }

    struct FailingCommit;

    impl DifferenceStreamListener<i64> for FailingCommit {
        fn new_difference(&self, _version: Version, _data: Multiset<i64>, _reply: Option<PullReply>) {}

        fn run(&self, _version: Version) -> Result<()> {
            Ok(())
        }

        fn commit(&self, version: Version) -> Result<()> {
            Err(Error::VersionOutOfOrder {
                last: version,
                got: version,
            })
        }
    }

    #[test]
    fn test_failed_commit_still_clears_requestors() {
        let stream = DifferenceStream::<i64>::new();
        stream.set_upstream(NoopOperator::new()).unwrap();
        let failing: Rc<dyn DifferenceStreamListener<i64>> = Rc::new(FailingCommit);
        let id = stream.add_listener(Rc::downgrade(&failing));
        assert!(stream.message_upstream(&PullRequest::new(1), id).unwrap());
        assert_eq!(stream.requestor_count(), 1);

        assert!(stream.commit(1).is_err());
        assert_eq!(stream.requestor_count(), 0);
    }

    #[test]
    fn test_duplicate_upstream_rejected() {
        let stream = DifferenceStream::<i64>::new();
        let op = || {
            Rc::new(NoopOperator {
                destroyed: Cell::new(false),
            })
        };
        stream.set_upstream(op()).unwrap();
        assert_eq!(stream.set_upstream(op()), Err(Error::UpstreamAlreadySet));
    }

    #[test]
    fn test_removing_last_listener_destroys_upstream() {
        let stream = DifferenceStream::<i64>::new();
        let upstream = Rc::new(NoopOperator {
            destroyed: Cell::new(false),
        });
        stream.set_upstream(upstream.clone()).unwrap();
        let (_a, a) = Recorder::attach(&stream);
        let (_b, b) = Recorder::attach(&stream);

        stream.remove_listener(a);
        assert!(!upstream.destroyed.get());
        assert!(stream.has_upstream());

        stream.remove_listener(b);
        assert!(upstream.destroyed.get());
        assert!(!stream.has_upstream());
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let stream = DifferenceStream::<i64>::new();
        let (recorder, _) = Recorder::attach(&stream);
        assert_eq!(stream.listener_count(), 1);
        drop(recorder);
        stream.new_data(1, Multiset::inserts(vec![1]), None);
        assert_eq!(stream.listener_count(), 0);
    }
}

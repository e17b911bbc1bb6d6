//! Ordered, optionally limited materialization of a stream.
//!
//! A `TreeView` keeps the values of its stream in a treap under the view's
//! comparator. With a limit it keeps only the first `limit` values and
//! caches the window's min and max:
//!
//! - below the limit every add is taken
//! - at the limit an add is taken only if it orders before the max, which
//!   is then evicted
//! - removals outside `[min, max]` are ignored; removing a boundary
//!   invalidates it until the next lookup
//!
//! Values evicted from a full window are not brought back when the window
//! later shrinks.

use crate::subscription::{SubscriptionId, SubscriptionManager};
use core::cmp::Ordering;
use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, trace};
use zql_core::{Record, Result};
use zql_incremental::{
    DifferenceStream, DifferenceStreamListener, Entry, ListenerId, Materialite, Multiset, PullReply, PullRequest,
    QueryKind, Version,
};
use zql_index::{Comparator, DynComparator, FieldComparator, Order, Treap};

struct Window<T> {
    tree: Treap<T>,
    comparator: DynComparator<T>,
    limit: Option<usize>,
    min: Option<T>,
    max: Option<T>,
}

impl<T: Clone> Window<T> {
    fn new(comparator: DynComparator<T>, limit: Option<usize>) -> Self {
        Self {
            tree: Treap::with_comparator(Rc::clone(&comparator)),
            comparator,
            limit,
            min: None,
            max: None,
        }
    }

    fn cmp(&self, a: &T, b: &T) -> Ordering {
        self.comparator.compare(a, b)
    }

    fn min(&mut self) -> Option<T> {
        if self.min.is_none() {
            self.min = self.tree.first().cloned();
        }
        self.min.clone()
    }

    fn max(&mut self) -> Option<T> {
        if self.max.is_none() {
            self.max = self.tree.last().cloned();
        }
        self.max.clone()
    }

    /// Drops cached boundaries equal to `value`.
    fn invalidate(&mut self, value: &T) {
        if self.min.as_ref().is_some_and(|m| self.cmp(m, value) == Ordering::Equal) {
            self.min = None;
        }
        if self.max.as_ref().is_some_and(|m| self.cmp(m, value) == Ordering::Equal) {
            self.max = None;
        }
    }

    fn widen(&mut self, value: &T) {
        if self.min.as_ref().is_some_and(|m| self.cmp(value, m) == Ordering::Less) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().is_some_and(|m| self.cmp(value, m) == Ordering::Greater) {
            self.max = Some(value.clone());
        }
    }

    fn add(&mut self, value: T) -> bool {
        let Some(limit) = self.limit else {
            self.tree.insert(value);
            return true;
        };
        if self.tree.contains(&value) {
            self.invalidate(&value);
            self.tree.insert(value);
            return true;
        }
        if self.tree.len() < limit {
            self.widen(&value);
            self.tree.insert(value);
            return true;
        }
        match self.max() {
            Some(max) if self.cmp(&value, &max) == Ordering::Less => {
                self.tree.remove(&max);
                self.max = None;
                self.widen(&value);
                self.tree.insert(value);
                true
            }
            _ => false,
        }
    }

    fn remove(&mut self, value: &T) -> bool {
        if self.limit.is_some() {
            let (Some(min), Some(max)) = (self.min(), self.max()) else {
                return false;
            };
            if self.cmp(value, &min) == Ordering::Less || self.cmp(value, &max) == Ordering::Greater {
                return false;
            }
            self.invalidate(value);
        }
        self.tree.remove(value).is_some()
    }

    fn replace(&mut self, old: &T, new: T) -> bool {
        if self.tree.contains(old) {
            self.invalidate(old);
            self.tree.insert(new);
            true
        } else {
            self.add(new)
        }
    }

    /// Applies a batch, folding each delete immediately followed by an add
    /// of an equal value into a replace. Returns true if anything changed.
    fn apply(&mut self, entries: Vec<Entry<T>>) -> bool {
        let mut changed = false;
        let mut iter = entries.into_iter().peekable();
        while let Some(entry) = iter.next() {
            if entry.is_delete() {
                let replaced_by = iter
                    .next_if(|next| next.is_insert() && self.cmp(&entry.value, &next.value) == Ordering::Equal);
                changed |= match replaced_by {
                    Some(next) => self.replace(&entry.value, next.value),
                    None => self.remove(&entry.value),
                };
            } else if entry.is_insert() {
                changed |= self.add(entry.value);
            }
        }
        changed
    }
}

struct TreeInner<T> {
    materialite: Materialite,
    stream: DifferenceStream<T>,
    listener: Cell<Option<ListenerId>>,
    window: RefCell<Window<T>>,
    pending: RefCell<Vec<Multiset<T>>>,
    changed: Cell<bool>,
    last_version: Cell<Option<Version>>,
    last_notified: Cell<Option<Version>>,
    subscriptions: RefCell<SubscriptionManager<[T]>>,
    order: Option<Vec<(String, Order)>>,
    query_kind: QueryKind,
}

impl<T: Clone + 'static> DifferenceStreamListener<T> for TreeInner<T> {
    fn new_difference(&self, _version: Version, data: Multiset<T>, _reply: Option<PullReply>) {
        self.pending.borrow_mut().push(data);
    }

    fn run(&self, version: Version) -> Result<()> {
        let batches = core::mem::take(&mut *self.pending.borrow_mut());
        let mut window = self.window.borrow_mut();
        for batch in batches {
            if window.apply(batch.to_vec()) {
                self.changed.set(true);
            }
        }
        trace!(target: "zql::view", version, len = window.tree.len(), "tree view ran");
        Ok(())
    }

    fn commit(&self, version: Version) -> Result<()> {
        self.last_version.set(Some(version));
        if !self.changed.get() || self.last_notified.get() == Some(version) {
            return Ok(());
        }
        self.changed.set(false);
        self.last_notified.set(Some(version));

        let snapshot = self.window.borrow().tree.to_vec();
        let callbacks = self.subscriptions.borrow().callbacks();
        debug!(
            target: "zql::view",
            version,
            len = snapshot.len(),
            subscribers = callbacks.len(),
            "tree view changed"
        );
        for callback in callbacks {
            callback(&snapshot);
        }
        Ok(())
    }
}

/// A live, ordered array materialized from a stream.
///
/// Cloning yields another handle to the same view. Subscribers are called
/// with the full contents at most once per version, and only for versions
/// that changed them.
pub struct TreeView<T> {
    inner: Rc<TreeInner<T>>,
}

impl<T> Clone for TreeView<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> TreeView<T> {
    /// Creates a view over `stream` ordered by `comparator`.
    pub fn new(
        materialite: &Materialite,
        stream: &DifferenceStream<T>,
        comparator: impl Comparator<T> + 'static,
        limit: Option<usize>,
    ) -> Self {
        let mut builder = TreeViewBuilder::new(materialite, stream, comparator);
        builder.limit = limit;
        builder.build()
    }

    fn attach(inner: TreeInner<T>) -> Self {
        let inner = Rc::new(inner);
        let listener: Rc<dyn DifferenceStreamListener<T>> = inner.clone();
        let id = inner.stream.add_listener(Rc::downgrade(&listener));
        inner.listener.set(Some(id));
        Self { inner }
    }

    /// Registers `callback`, called with the contents after each version
    /// that changed them.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[T]) + 'static,
    {
        self.inner.subscriptions.borrow_mut().subscribe(callback)
    }

    /// Removes a subscription. Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.borrow_mut().unsubscribe(id)
    }

    /// Asks the upstream sources for their current contents.
    ///
    /// The request carries the view's ordering and query kind and runs in
    /// its own transaction, so every source answers within one version.
    /// Returns false if no source accepted it or the view is destroyed.
    pub fn pull_historical_data(&self) -> Result<bool> {
        let Some(id) = self.inner.listener.get() else {
            return Ok(false);
        };
        let mut request =
            PullRequest::new(self.inner.materialite.next_request_id()).with_query_kind(self.inner.query_kind);
        if let Some(order) = &self.inner.order {
            request = request.with_order(order.clone());
        }
        debug!(target: "zql::view", request = request.id, "pulling historical data");
        self.inner
            .materialite
            .tx(|| self.inner.stream.message_upstream(&request, id))
    }

    /// The current contents in view order.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.window.borrow().tree.to_vec()
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.inner.window.borrow().tree.len()
    }

    /// Returns true if the view holds nothing.
    pub fn is_empty(&self) -> bool {
        self.inner.window.borrow().tree.is_empty()
    }

    /// Maximum number of values kept, if limited.
    pub fn limit(&self) -> Option<usize> {
        self.inner.window.borrow().limit
    }

    /// Ordering of the view's contents.
    pub fn comparator(&self) -> DynComparator<T> {
        Rc::clone(&self.inner.window.borrow().comparator)
    }

    /// Last version committed to the view.
    pub fn last_version(&self) -> Option<Version> {
        self.inner.last_version.get()
    }

    /// Returns true once `destroy` has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.listener.get().is_none()
    }

    /// Detaches the view from its stream and drops its subscriptions. The
    /// contents stay readable, frozen at the moment of destruction.
    pub fn destroy(&self) {
        if let Some(id) = self.inner.listener.take() {
            self.inner.stream.remove_listener(id);
            self.inner.subscriptions.borrow_mut().clear();
            self.inner.pending.borrow_mut().clear();
            debug!(target: "zql::view", "tree view destroyed");
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for TreeView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeView")
            .field("limit", &self.limit())
            .field("last_version", &self.last_version())
            .field("values", &self.inner.window.borrow().tree)
            .finish()
    }
}

/// Builder for [`TreeView`].
pub struct TreeViewBuilder<T> {
    materialite: Materialite,
    stream: DifferenceStream<T>,
    comparator: DynComparator<T>,
    limit: Option<usize>,
    order: Option<Vec<(String, Order)>>,
    query_kind: QueryKind,
}

impl<T: Clone + 'static> TreeViewBuilder<T> {
    /// Starts a view over `stream` ordered by `comparator`.
    pub fn new(materialite: &Materialite, stream: &DifferenceStream<T>, comparator: impl Comparator<T> + 'static) -> Self {
        Self {
            materialite: materialite.clone(),
            stream: stream.clone(),
            comparator: Rc::new(comparator),
            limit: None,
            order: None,
            query_kind: QueryKind::Select,
        }
    }

    /// Keeps only the first `limit` values.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Ordering description sent with pull requests.
    pub fn order<S: Into<String>>(mut self, order: impl IntoIterator<Item = (S, Order)>) -> Self {
        self.order = Some(order.into_iter().map(|(f, o)| (f.into(), o)).collect());
        self
    }

    /// Query kind sent with pull requests.
    pub fn query_kind(mut self, kind: QueryKind) -> Self {
        self.query_kind = kind;
        self
    }

    /// Creates the view and attaches it to the stream.
    pub fn build(self) -> TreeView<T> {
        TreeView::attach(TreeInner {
            materialite: self.materialite,
            stream: self.stream,
            listener: Cell::new(None),
            window: RefCell::new(Window::new(self.comparator, self.limit)),
            pending: RefCell::new(Vec::new()),
            changed: Cell::new(false),
            last_version: Cell::new(None),
            last_notified: Cell::new(None),
            subscriptions: RefCell::new(SubscriptionManager::new()),
            order: self.order,
            query_kind: self.query_kind,
        })
    }
}

impl TreeViewBuilder<Record> {
    /// Starts a record view ordered by `comparator`, describing the same
    /// ordering (id last) in pull requests.
    pub fn by_fields(materialite: &Materialite, stream: &DifferenceStream<Record>, comparator: FieldComparator) -> Self {
        let mut order = comparator.fields().to_vec();
        order.push((zql_core::ID_FIELD.to_string(), Order::Asc));
        Self::new(materialite, stream, comparator).order(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zql_index::SimpleComparator;

    fn window(limit: Option<usize>) -> Window<i64> {
        Window::new(Rc::new(SimpleComparator::asc()), limit)
    }

    fn adds(values: &[i64]) -> Vec<Entry<i64>> {
        values.iter().copied().map(Entry::insert).collect()
    }

    #[test]
    fn test_unlimited_window() {
        let mut w = window(None);
        assert!(w.apply(adds(&[3, 1, 2])));
        assert!(w.apply(vec![Entry::delete(1)]));
        assert!(!w.apply(vec![Entry::delete(7)]));
        assert_eq!(w.tree.to_vec(), vec![2, 3]);
    }

    #[test]
    fn test_limit_evicts_max() {
        let mut w = window(Some(2));
        w.apply(adds(&[5, 3]));
        // Not before the max: dropped.
        assert!(!w.apply(adds(&[9])));
        assert!(w.apply(adds(&[1])));
        assert_eq!(w.tree.to_vec(), vec![1, 3]);
        assert_eq!(w.max(), Some(3));
        assert_eq!(w.min(), Some(1));
    }

    #[test]
    fn test_limit_ignores_removals_outside_window() {
        let mut w = window(Some(2));
        w.apply(adds(&[1, 2, 3]));
        assert!(!w.apply(vec![Entry::delete(3)]));
        assert!(w.apply(vec![Entry::delete(2)]));
        assert_eq!(w.tree.to_vec(), vec![1]);
        // The removed max was invalidated and is recomputed.
        assert_eq!(w.max(), Some(1));
        assert!(w.apply(adds(&[4])));
        assert_eq!(w.tree.to_vec(), vec![1, 4]);
    }

    #[test]
    fn test_zero_limit_holds_nothing() {
        let mut w = window(Some(0));
        assert!(!w.apply(adds(&[1])));
        assert!(w.tree.is_empty());
    }

    #[test]
    fn test_delete_then_add_equal_is_replace() {
        let cmp = FieldComparator::by_id();
        let mut w = Window::new(Rc::new(cmp), Some(1));
        let a1 = Record::new().with("id", "a").with("n", 1i64);
        let a2 = Record::new().with("id", "a").with("n", 2i64);
        w.apply(vec![Entry::insert(a1.clone())]);
        assert!(w.apply(vec![Entry::delete(a1), Entry::insert(a2.clone())]));
        assert_eq!(w.tree.to_vec(), vec![a2]);
    }
}

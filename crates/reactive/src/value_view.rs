//! Scalar materialization of a stream.

use crate::subscription::{SubscriptionId, SubscriptionManager};
use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::debug;
use zql_core::Result;
use zql_incremental::{DifferenceStream, DifferenceStreamListener, ListenerId, Multiset, PullReply, Version};

struct ValueInner<T> {
    stream: DifferenceStream<T>,
    listener: Cell<Option<ListenerId>>,
    value: RefCell<Option<T>>,
    pending: RefCell<Vec<Multiset<T>>>,
    changed: Cell<bool>,
    last_version: Cell<Option<Version>>,
    last_notified: Cell<Option<Version>>,
    subscriptions: RefCell<SubscriptionManager<Option<T>>>,
}

impl<T: Clone + PartialEq + 'static> DifferenceStreamListener<T> for ValueInner<T> {
    fn new_difference(&self, _version: Version, data: Multiset<T>, _reply: Option<PullReply>) {
        self.pending.borrow_mut().push(data);
    }

    fn run(&self, _version: Version) -> Result<()> {
        let batches = core::mem::take(&mut *self.pending.borrow_mut());
        let mut value = self.value.borrow_mut();
        for batch in batches {
            let mut next = value.clone();
            for entry in batch.iter() {
                if entry.is_insert() {
                    next = Some(entry.value);
                } else if entry.is_delete() && next.as_ref() == Some(&entry.value) {
                    next = None;
                }
            }
            if next != *value {
                *value = next;
                self.changed.set(true);
            }
        }
        Ok(())
    }

    fn commit(&self, version: Version) -> Result<()> {
        self.last_version.set(Some(version));
        if !self.changed.get() || self.last_notified.get() == Some(version) {
            return Ok(());
        }
        self.changed.set(false);
        self.last_notified.set(Some(version));

        let value = self.value.borrow().clone();
        let callbacks = self.subscriptions.borrow().callbacks();
        debug!(target: "zql::view", version, subscribers = callbacks.len(), "value view changed");
        for callback in callbacks {
            callback(&value);
        }
        Ok(())
    }
}

/// A live scalar materialized from a stream, such as the row emitted by
/// `count()`.
///
/// The view holds the value of the latest insert it received. Retracting
/// that value without a replacement leaves the view empty.
pub struct ValueView<T> {
    inner: Rc<ValueInner<T>>,
}

impl<T> Clone for ValueView<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> ValueView<T> {
    /// Creates a view over `stream` holding `initial` until the first
    /// change arrives.
    pub fn new(stream: &DifferenceStream<T>, initial: Option<T>) -> Self {
        let inner = Rc::new(ValueInner {
            stream: stream.clone(),
            listener: Cell::new(None),
            value: RefCell::new(initial),
            pending: RefCell::new(Vec::new()),
            changed: Cell::new(false),
            last_version: Cell::new(None),
            last_notified: Cell::new(None),
            subscriptions: RefCell::new(SubscriptionManager::new()),
        });
        let listener: Rc<dyn DifferenceStreamListener<T>> = inner.clone();
        let id = stream.add_listener(Rc::downgrade(&listener));
        inner.listener.set(Some(id));
        Self { inner }
    }

    /// The current value.
    pub fn value(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Registers `callback`, called with the value after each version that
    /// changed it.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Option<T>) + 'static,
    {
        self.inner.subscriptions.borrow_mut().subscribe(callback)
    }

    /// Removes a subscription. Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.borrow_mut().unsubscribe(id)
    }

    /// Last version committed to the view.
    pub fn last_version(&self) -> Option<Version> {
        self.inner.last_version.get()
    }

    /// Detaches the view from its stream. The value stays readable.
    pub fn destroy(&self) {
        if let Some(id) = self.inner.listener.take() {
            self.inner.stream.remove_listener(id);
            self.inner.subscriptions.borrow_mut().clear();
            self.inner.pending.borrow_mut().clear();
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for ValueView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueView")
            .field("value", &*self.inner.value.borrow())
            .field("last_version", &self.inner.last_version.get())
            .finish()
    }
}

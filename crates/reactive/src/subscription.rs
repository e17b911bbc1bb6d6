//! Subscription management for materialized views.
//!
//! This module provides subscription IDs and a manager for tracking the
//! callbacks registered on a view.

use hashbrown::HashMap;
use std::rc::Rc;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback invoked with a view's contents after a version changed them.
pub type ChangeCallback<P> = Rc<dyn Fn(&P)>;

/// A registered callback.
pub struct Subscription<P: ?Sized> {
    /// Unique identifier
    id: SubscriptionId,
    /// Callback to invoke on changes
    callback: ChangeCallback<P>,
}

impl<P: ?Sized> Subscription<P> {
    /// Creates a new subscription.
    pub fn new<F>(id: SubscriptionId, callback: F) -> Self
    where
        F: Fn(&P) + 'static,
    {
        Self {
            id,
            callback: Rc::new(callback),
        }
    }

    /// Returns the subscription ID.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns a handle to the callback.
    pub fn callback(&self) -> ChangeCallback<P> {
        Rc::clone(&self.callback)
    }
}

/// Manages the subscriptions of one view.
///
/// Views keep the manager behind a `RefCell`. To let a callback subscribe
/// or unsubscribe while being notified, views take a [`callbacks`] snapshot
/// and release the borrow before invoking anything.
///
/// [`callbacks`]: SubscriptionManager::callbacks
pub struct SubscriptionManager<P: ?Sized> {
    /// Active subscriptions
    subscriptions: HashMap<SubscriptionId, Subscription<P>>,
    /// Next subscription ID to assign
    next_id: SubscriptionId,
}

impl<P: ?Sized> Default for SubscriptionManager<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized> SubscriptionManager<P> {
    /// Creates a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Subscribes with the given callback.
    ///
    /// Returns the subscription ID that can be used to unsubscribe.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&P) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, Subscription::new(id, callback));
        id
    }

    /// Unsubscribes by ID.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Handles to every callback, in subscription order.
    pub fn callbacks(&self) -> Vec<ChangeCallback<P>> {
        let mut subs: Vec<&Subscription<P>> = self.subscriptions.values().collect();
        subs.sort_by_key(|s| s.id());
        subs.into_iter().map(Subscription::callback).collect()
    }

    /// Returns the number of subscriptions.
    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns true if there are no subscriptions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Clears all subscriptions.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

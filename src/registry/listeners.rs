use std::sync::{Arc, Weak};

use tracing::trace;

pub(crate) type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies one subscription on one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// The raw sequence number. Ids grow in subscription order per entry.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Ordered observer set for a single entry.
pub(crate) struct ListenerSet<T> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<T>)>,
}

impl<T> ListenerSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, listener: Listener<T>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        match self.listeners.iter().position(|(existing, _)| *existing == id) {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|(existing, _)| *existing == id)
    }

    /// Clone the current listeners so they can be called without the lock held.
    pub(crate) fn snapshot(&self) -> Vec<(ListenerId, Listener<T>)> {
        self.listeners.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

/// Something a [`Subscription`] can remove itself from.
pub(crate) trait ListenerOwner: Send + Sync {
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Handle returned by [`ExposedState::subscribe`](crate::ExposedState::subscribe).
///
/// Dropping the handle unsubscribes the callback. Call [`detach`](Self::detach)
/// to keep the callback registered for as long as the entry lives.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    id: Option<ListenerId>,
    owner: Weak<dyn ListenerOwner>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, owner: Weak<dyn ListenerOwner>) -> Self {
        Self {
            id: Some(id),
            owner,
        }
    }

    /// A subscription that is not attached to anything. Returned when
    /// subscribing to an entry that has already been torn down.
    pub(crate) fn inert() -> Self {
        Self {
            id: None,
            owner: Weak::<Inert>::new(),
        }
    }

    /// The listener id, or `None` for an inert or released subscription.
    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    /// Returns `true` while the callback is still registered.
    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.owner.strong_count() > 0
    }

    /// Remove the callback. Calling this more than once is a no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(owner) = self.owner.upgrade() {
                let removed = owner.remove_listener(id);
                trace!(listener = id.get(), removed, "unsubscribed");
            }
        }
    }

    /// Release the handle without unsubscribing.
    pub fn detach(mut self) -> Option<ListenerId> {
        self.id.take()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

struct Inert;

impl ListenerOwner for Inert {
    fn remove_listener(&self, _id: ListenerId) -> bool {
        false
    }
}

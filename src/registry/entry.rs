use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::trace;

use super::listeners::{ListenerId, ListenerOwner, ListenerSet, Subscription};
use crate::action::SetStateAction;
use crate::bridge::Setter;

/// One commit's place in the delivery order.
enum Slot<T> {
    /// The owning cell is still producing the value.
    Reserved,
    Ready(T),
    /// Dropped: the entry was detached or the writer lost ownership.
    Skipped,
}

/// Commits of the current cycle, in the order their writes began.
struct Delivery<T> {
    slots: VecDeque<Slot<T>>,
    // Sequence number of `slots[0]`.
    head: u64,
    next: u64,
    // Highest sequence number mirrored into `state` this cycle.
    latest: Option<u64>,
    active: bool,
}

impl<T> Delivery<T> {
    fn new() -> Self {
        Self {
            slots: VecDeque::new(),
            head: 0,
            next: 0,
            latest: None,
            active: false,
        }
    }

    fn reserve(&mut self) -> u64 {
        let seq = self.next;
        self.next += 1;
        self.slots.push_back(Slot::Reserved);
        seq
    }

    fn fill(&mut self, seq: u64, slot: Slot<T>) {
        if let Some(reserved) = self.slots.get_mut((seq - self.head) as usize) {
            *reserved = slot;
        }
    }

    fn pop(&mut self) -> Option<Slot<T>> {
        let slot = self.slots.pop_front()?;
        self.head += 1;
        Some(slot)
    }
}

/// Owner id plus the commit function of the bridge instance controlling
/// the entry.
struct Binding<T> {
    owner: u64,
    setter: Setter<T>,
}

/// Shared record behind every [`ExposedState`] handle for one key.
pub(crate) struct EntryRecord<T> {
    key: String,
    state: Mutex<T>,
    listeners: Mutex<ListenerSet<T>>,
    binding: Mutex<Option<Binding<T>>>,
    // Serializes commits. Reentrant so a subscriber may write during fan-out.
    gate: ReentrantMutex<RefCell<Delivery<T>>>,
    live: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> EntryRecord<T> {
    pub(crate) fn new(key: impl Into<String>, initial: T) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            state: Mutex::new(initial),
            listeners: Mutex::new(ListenerSet::new()),
            binding: Mutex::new(None),
            gate: ReentrantMutex::new(RefCell::new(Delivery::new())),
            live: AtomicBool::new(true),
        })
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> T {
        self.state.lock().clone()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.lock();
        f(&state)
    }

    /// Point the entry at a bridge instance and overwrite its value.
    ///
    /// With `announce` set the value goes through the commit path, so
    /// subscribers kept from the previous owner see it.
    pub(crate) fn bind(&self, owner: u64, setter: Setter<T>, value: T, announce: bool) {
        let _gate = self.gate.lock();
        *self.binding.lock() = Some(Binding { owner, setter });
        if announce {
            self.commit(Some(owner), || value);
        } else {
            *self.state.lock() = value;
        }
    }

    pub(crate) fn is_owned_by(&self, owner: u64) -> bool {
        self.binding
            .lock()
            .as_ref()
            .is_some_and(|binding| binding.owner == owner)
    }

    pub(crate) fn setter(&self) -> Option<Setter<T>> {
        self.binding
            .lock()
            .as_ref()
            .map(|binding| binding.setter.clone())
    }

    /// Whether a commit from `owner` may touch the entry. `None` stands for
    /// a direct write into an unbound entry.
    fn accepts(&self, owner: Option<u64>) -> bool {
        if !self.is_live() {
            return false;
        }
        let binding = self.binding.lock();
        match (owner, binding.as_ref()) {
            (Some(owner), Some(binding)) => binding.owner == owner,
            (None, None) => true,
            _ => false,
        }
    }

    /// The single commit path.
    ///
    /// `produce` runs under the write gate and yields the value accepted by
    /// the writer's cell. `produce` always runs; its value is mirrored into
    /// `state` and delivered to every subscriber only if `owner` still
    /// controls the entry once it returns. Delivery happens before the
    /// outermost commit returns.
    ///
    /// Commits are ordered by when they start. A write issued while `produce`
    /// runs (a render hook writing back) or from inside a subscriber is
    /// delivered after this one, and `state` ends on the latest of them.
    pub(crate) fn commit(&self, owner: Option<u64>, produce: impl FnOnce() -> T) {
        let gate = self.gate.lock();
        let (seq, outermost) = {
            let mut delivery = gate.borrow_mut();
            let outermost = !delivery.active;
            delivery.active = true;
            (delivery.reserve(), outermost)
        };
        let _cycle = outermost.then(|| CycleGuard(&*gate));

        let value = produce();
        {
            let mut delivery = gate.borrow_mut();
            if self.accepts(owner) {
                if delivery.latest.map_or(true, |latest| seq > latest) {
                    *self.state.lock() = value.clone();
                    delivery.latest = Some(seq);
                }
                delivery.fill(seq, Slot::Ready(value));
            } else {
                trace!(key = %self.key, ?owner, "local-only write");
                delivery.fill(seq, Slot::Skipped);
            }
        }
        if !outermost {
            return;
        }

        loop {
            let next = gate.borrow_mut().pop();
            let value = match next {
                Some(Slot::Ready(value)) => value,
                Some(_) => continue,
                None => break,
            };
            let listeners = self.listeners.lock().snapshot();
            trace!(key = %self.key, listeners = listeners.len(), "fan-out");
            for (id, listener) in listeners {
                // Skip callbacks unsubscribed earlier in this fan-out.
                if self.listeners.lock().contains(id) {
                    listener(&value);
                }
            }
        }
    }

    /// Mirror `value` only if it differs from what the entry holds and
    /// `owner` may write to it.
    pub(crate) fn commit_if_changed(&self, owner: Option<u64>, value: T) -> bool
    where
        T: PartialEq,
    {
        let _gate = self.gate.lock();
        if !self.accepts(owner) || *self.state.lock() == value {
            return false;
        }
        self.commit(owner, || value);
        true
    }

    /// Route a write to the owning bridge, or commit it directly when the
    /// entry is not bound to any cell.
    pub(crate) fn write(&self, action: SetStateAction<T>) {
        // Held across routing so the binding cannot change underneath.
        let _gate = self.gate.lock();
        if !self.is_live() {
            trace!(key = %self.key, "write after teardown ignored");
            return;
        }
        match self.setter() {
            Some(setter) => setter.dispatch(action),
            None => self.commit(None, || {
                let prev = self.state();
                action.resolve(&prev)
            }),
        }
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        listener: Arc<dyn Fn(&T) + Send + Sync>,
    ) -> Subscription {
        if !self.is_live() {
            trace!(key = %self.key, "subscribe on detached entry");
            return Subscription::inert();
        }
        let id = self.listeners.lock().insert(listener);
        trace!(key = %self.key, listener = id.get(), "subscribed");
        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription::new(id, weak)
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(id)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T> ListenerOwner for EntryRecord<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn remove_listener(&self, id: ListenerId) -> bool {
        self.unsubscribe(id)
    }
}

/// Ends a commit cycle, also when a cell or subscriber panics.
struct CycleGuard<'a, T>(&'a RefCell<Delivery<T>>);

impl<T> Drop for CycleGuard<'_, T> {
    fn drop(&mut self) {
        let mut delivery = self.0.borrow_mut();
        delivery.active = false;
        delivery.slots.clear();
        delivery.head = delivery.next;
        delivery.latest = None;
    }
}

/// Type-erased view the registry keeps for every entry.
pub(crate) trait ErasedEntry: Send + Sync {
    fn detach(&self);
    fn type_name(&self) -> &'static str;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Clone + Send + Sync + 'static> ErasedEntry for EntryRecord<T> {
    /// Tear the record down: no further commits, no listeners, no writer.
    fn detach(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.listeners.lock().clear();
        self.binding.lock().take();
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Externally visible handle onto the state exposed under one key.
///
/// Handles are cheap to clone and all point at the same record. Once the
/// owning component unmounts the handle goes stale: reads return the last
/// value, writes are ignored and new subscriptions never fire.
///
/// # Examples
///
/// ```
/// use exposed_state::{ExposedState, Registry};
///
/// let registry = Registry::new();
/// registry.set("volume", ExposedState::new("volume", 3u8));
///
/// let entry = registry.get::<u8>("volume").unwrap();
/// entry.update(|v| v + 1);
/// assert_eq!(entry.state(), 4);
/// ```
pub struct ExposedState<T> {
    pub(crate) record: Arc<EntryRecord<T>>,
}

impl<T> Clone for ExposedState<T> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ExposedState<T> {
    /// Create an entry that is not bound to any component.
    ///
    /// Writes to an unbound entry commit straight into it. Bridges create
    /// their own entries; this is for tooling and tests that install values
    /// with [`Registry::set`](crate::Registry::set).
    pub fn new(key: impl Into<String>, initial: T) -> Self {
        Self {
            record: EntryRecord::new(key, initial),
        }
    }

    pub(crate) fn from_record(record: Arc<EntryRecord<T>>) -> Self {
        Self { record }
    }

    /// The key this entry is exposed under.
    pub fn key(&self) -> &str {
        self.record.key()
    }

    /// A clone of the current value.
    pub fn state(&self) -> T {
        self.record.state()
    }

    /// Read the current value without cloning.
    ///
    /// Do not write to the entry from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.record.with_state(f)
    }

    /// Apply a write request through the owning component's write path.
    ///
    /// A no-op once the owning component has unmounted.
    pub fn set_state(&self, action: SetStateAction<T>) {
        self.record.write(action);
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.set_state(SetStateAction::Value(value));
    }

    /// Compute the next value from the latest one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.set_state(SetStateAction::update(f));
    }

    /// Register `callback` to receive every committed value.
    ///
    /// Callbacks run synchronously, in subscription order, after `state`
    /// has been updated. Subscribing to a torn-down entry returns an inert
    /// handle.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.record.subscribe(Arc::new(callback))
    }

    /// Remove a callback by id. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.record.unsubscribe(id)
    }

    /// The setter of the component instance currently controlling this entry.
    pub fn setter(&self) -> Option<Setter<T>> {
        self.record.setter()
    }

    /// Returns `false` once the entry has been removed from its registry.
    pub fn is_live(&self) -> bool {
        self.record.is_live()
    }

    /// Number of callbacks currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        self.record.subscriber_count()
    }

    /// Returns `true` when both handles refer to the same record.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.record, &b.record)
    }
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> fmt::Debug for ExposedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposedState")
            .field("key", &self.key())
            .field("state", &self.state())
            .field("subscribers", &self.subscriber_count())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn unbound_entry_commits_directly() {
        let entry = ExposedState::new("count", 1);
        entry.set(4);
        assert_eq!(entry.state(), 4);
        entry.update(|v| v * 2);
        assert_eq!(entry.state(), 8);
        assert!(entry.setter().is_none());
    }

    #[test]
    fn subscribers_see_every_write_in_order() {
        let entry = ExposedState::new("count", 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = entry.subscribe(move |v| seen_clone.lock().push(*v));

        entry.set(1);
        entry.set(1);
        entry.update(|v| v + 1);

        assert_eq!(*seen.lock(), vec![1, 1, 2]);
    }

    #[test]
    fn callback_observes_committed_state() {
        let entry = ExposedState::new("count", 0);
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();
        let reader = entry.clone();
        let _sub = entry.subscribe(move |_| {
            *observed_clone.lock() = Some(reader.state());
        });

        entry.set(9);
        assert_eq!(*observed.lock(), Some(9));
    }

    #[test]
    fn reentrant_write_is_delivered_after_current_value() {
        let entry = ExposedState::new("count", 0);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let writer = entry.clone();
        let _first = entry.subscribe(move |v| {
            if *v == 1 {
                writer.set(2);
            }
        });
        let seen_clone = seen.clone();
        let _second = entry.subscribe(move |v| seen_clone.lock().push(*v));

        entry.set(1);

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(entry.state(), 2);
    }

    #[test]
    fn write_started_while_producing_is_delivered_second() {
        let entry = ExposedState::new("count", 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = entry.subscribe(move |v| seen_clone.lock().push(*v));

        let record = Arc::clone(&entry.record);
        entry.record.commit(None, || {
            record.commit(None, || 2);
            1
        });

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(entry.state(), 2);
    }

    #[test]
    fn commit_from_non_owner_only_runs_producer() {
        let entry = ExposedState::new("count", 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = entry.subscribe(move |v| seen_clone.lock().push(*v));
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        entry.record.commit(Some(7), || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            5
        });

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(entry.state(), 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn unsubscribe_during_fan_out_skips_listener() {
        let entry = ExposedState::new("count", 0);
        let calls = Arc::new(AtomicUsize::new(0));

        let second_id = Arc::new(Mutex::new(None));
        let target = entry.clone();
        let second_id_clone = second_id.clone();
        let _first = entry.subscribe(move |_| {
            if let Some(id) = *second_id_clone.lock() {
                target.unsubscribe(id);
            }
        });
        let calls_clone = calls.clone();
        let second = entry.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        *second_id.lock() = second.detach();

        entry.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(entry.subscriber_count(), 1);
    }

    #[test]
    fn detached_entry_ignores_writes_and_subscriptions() {
        let entry = ExposedState::new("count", 3);
        entry.record.detach();

        entry.set(10);
        assert_eq!(entry.state(), 3);

        let sub = entry.subscribe(|_| panic!("stale subscription fired"));
        assert!(!sub.is_active());
        assert_eq!(entry.subscriber_count(), 0);
    }

    #[test]
    fn commit_if_changed_skips_equal_values() {
        let entry = ExposedState::new("count", 5);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _sub = entry.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!entry.record.commit_if_changed(None, 5));
        assert!(entry.record.commit_if_changed(None, 6));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

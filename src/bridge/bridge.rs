use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use super::Setter;
use crate::host::{IdSource, StateCell};
use crate::registry::{EntryRecord, ExposedState, Registry};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// Mount handle tying one local state cell to one registry entry.
///
/// The entry lives as long as this handle: dropping it (or calling
/// [`unmount`](Self::unmount)) removes the entry and all of its subscribers,
/// provided this instance still owns the key.
///
/// # Examples
///
/// ```
/// use exposed_state::{Exposed, Registry, SequentialIds, use_state};
/// use std::sync::Arc;
///
/// let registry = Arc::new(Registry::new());
/// let ids = SequentialIds::with_prefix("cmp-");
///
/// let count = use_state(0);
/// let exposed = Exposed::mount(count.clone(), None, &ids, registry.clone());
/// assert_eq!(exposed.key(), "cmp-0");
///
/// registry.get::<i32>("cmp-0").unwrap().set(5);
/// assert_eq!(count.get(), 5);
///
/// exposed.unmount();
/// assert!(!registry.has("cmp-0"));
/// ```
pub struct Exposed<T: Clone + Send + Sync + 'static> {
    key: String,
    instance: u64,
    cell: Arc<dyn StateCell<T>>,
    setter: Setter<T>,
    record: Arc<EntryRecord<T>>,
    registry: Arc<Registry>,
}

impl<T: Clone + Send + Sync + 'static> Exposed<T> {
    /// Expose `cell` in `registry`.
    ///
    /// `key` names the entry; `None` or an empty key falls back to an id from
    /// `ids`, fetched once for the lifetime of this mount. If the key is
    /// already exposed with the same value type, this instance takes it over
    /// and existing subscribers stay attached and receive its value.
    pub fn mount<C>(
        cell: C,
        key: Option<&str>,
        ids: &dyn IdSource,
        registry: Arc<Registry>,
    ) -> Self
    where
        C: StateCell<T>,
    {
        let key = match key {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => ids.next_id(),
        };
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::SeqCst);
        let cell: Arc<dyn StateCell<T>> = Arc::new(cell);

        let value = cell.current();
        let (record, created) = registry.entry_or_insert(&key, &value);
        let setter = write_path(instance, Arc::clone(&cell), Arc::downgrade(&record));
        record.bind(instance, setter.clone(), value, !created);

        if created {
            debug!(key = %key, instance, "state exposed");
        } else {
            debug!(key = %key, instance, "state rebound to newer instance");
        }

        Self {
            key,
            instance,
            cell,
            setter,
            record,
            registry,
        }
    }

    /// The key the state is exposed under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value held by the local cell.
    pub fn value(&self) -> T {
        self.cell.current()
    }

    /// The wrapped setter. Writes through it re-render the owner, refresh the
    /// entry and notify subscribers.
    pub fn setter(&self) -> Setter<T> {
        self.setter.clone()
    }

    /// `(value, setter)`, the same shape as the wrapped cell.
    pub fn state(&self) -> (T, Setter<T>) {
        (self.value(), self.setter())
    }

    /// A handle to this instance's registry entry.
    pub fn entry(&self) -> ExposedState<T> {
        ExposedState::from_record(Arc::clone(&self.record))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns `true` while this instance controls writes to its key.
    pub fn is_owner(&self) -> bool {
        self.record.is_live() && self.record.is_owned_by(self.instance)
    }

    /// Update pass: mirror a value that reached the cell without going
    /// through [`setter`](Self::setter).
    ///
    /// Notifies subscribers only when the value differs from the entry's.
    /// Returns `true` when a new value was published.
    pub fn sync(&self) -> bool
    where
        T: PartialEq,
    {
        let published = self
            .record
            .commit_if_changed(Some(self.instance), self.cell.current());
        if published {
            trace!(key = %self.key, "out-of-band local write mirrored");
        }
        published
    }

    /// Unmount explicitly. Equivalent to dropping the handle.
    pub fn unmount(self) {}

    fn teardown(&mut self) {
        if !self.record.is_owned_by(self.instance) {
            debug!(
                key = %self.key,
                instance = self.instance,
                "unmounted superseded instance"
            );
            return;
        }
        if self.registry.remove_record(&self.key, &self.record) {
            debug!(key = %self.key, instance = self.instance, "state unexposed");
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for Exposed<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> fmt::Debug for Exposed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exposed")
            .field("key", &self.key)
            .field("instance", &self.instance)
            .field("value", &self.value())
            .field("owner", &self.is_owner())
            .finish()
    }
}

/// Build the commit function shared by the component and the entry.
fn write_path<T>(
    instance: u64,
    cell: Arc<dyn StateCell<T>>,
    record: Weak<EntryRecord<T>>,
) -> Setter<T>
where
    T: Clone + Send + Sync + 'static,
{
    // Ownership is settled inside `commit`, under the entry's write gate.
    Setter::new(move |action| match record.upgrade() {
        Some(record) => record.commit(Some(instance), || cell.dispatch(action)),
        None => {
            cell.dispatch(action);
            trace!(instance, "local-only write");
        }
    })
}

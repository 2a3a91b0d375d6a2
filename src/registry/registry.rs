use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::entry::{EntryRecord, ErasedEntry, ExposedState};
use crate::error::RegistryError;

/// Keyed store of exposed state.
///
/// There is one process-wide instance reachable through
/// [`Registry::global`], which is what devtools and test harnesses talk to.
/// Scoped registries can be pushed for isolation.
///
/// # Examples
///
/// Reading state exposed by a component:
///
/// ```
/// use exposed_state::{expose, use_state, Registry};
///
/// Registry::scope(|| {
///     let _counter = expose(use_state(0), Some("clicks"));
///
///     let registry = Registry::current();
///     assert!(registry.has("clicks"));
///     assert_eq!(registry.get::<i32>("clicks").unwrap().state(), 0);
/// });
/// ```
pub struct Registry {
    entries: Mutex<HashMap<String, Arc<dyn ErasedEntry>>>,
}

// Thread-local stack for scoped registries
thread_local! {
    static REGISTRY_STACK: RefCell<Vec<Arc<Registry>>> = const { RefCell::new(Vec::new()) };
}

impl Registry {
    /// Create an empty, independent registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    ///
    /// Used whenever no scoped registry is active.
    pub fn global() -> Arc<Self> {
        static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();
        Arc::clone(REGISTRY.get_or_init(|| Arc::new(Registry::new())))
    }

    /// The current registry (innermost scope, or the global one).
    pub fn current() -> Arc<Self> {
        REGISTRY_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::global)
        })
    }

    /// Run a function with a fresh isolated registry as the current one.
    ///
    /// Everything exposed inside `f` lands in that registry, which is
    /// dropped when `f` returns unless a mount handle escapes the scope.
    ///
    /// ```
    /// use exposed_state::{expose, use_state, Registry};
    ///
    /// Registry::scope(|| {
    ///     let _mount = expose(use_state("idle"), Some("status"));
    ///     assert!(Registry::current().has("status"));
    /// });
    /// assert!(!Registry::global().has("status"));
    /// ```
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_registry(Arc::new(Self::new()), f)
    }

    /// Run a function with `registry` as the current registry.
    pub fn with_registry<F, R>(registry: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        REGISTRY_STACK.with(|stack| {
            stack.borrow_mut().push(registry);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        REGISTRY_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Look up the entry for `key`.
    ///
    /// Returns `None` when nothing is exposed under `key` or when the exposed
    /// value is not a `T`.
    pub fn get<T>(&self, key: &str) -> Option<ExposedState<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.try_get(key).ok()
    }

    /// Like [`get`](Self::get), reporting why the lookup failed.
    pub fn try_get<T>(&self, key: &str) -> Result<ExposedState<T>, RegistryError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let erased = self
            .entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                key: key.to_string(),
            })?;

        erased
            .into_any()
            .downcast::<EntryRecord<T>>()
            .map(ExposedState::from_record)
            .map_err(|_| RegistryError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Install `entry` under `key`, replacing and tearing down any previous one.
    ///
    /// Bridges manage their own entries; this is for tooling that wants to
    /// publish a standalone value. `key` must be the key the entry was
    /// created with, and the entry must still be live. Otherwise nothing is
    /// installed and `false` is returned.
    pub fn set<T>(&self, key: impl Into<String>, entry: ExposedState<T>) -> bool
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = key.into();
        if !entry.is_live() {
            debug!(key = %key, "refused to install a detached entry");
            return false;
        }
        if entry.key() != key {
            debug!(
                key = %key,
                entry_key = %entry.key(),
                "refused to install entry under another key"
            );
            return false;
        }
        let record: Arc<dyn ErasedEntry> = entry.record;
        let previous = self.entries.lock().insert(key.clone(), Arc::clone(&record));
        debug!(key = %key, "entry installed");
        if let Some(previous) = previous {
            if !same_record(&previous, &record) {
                previous.detach();
            }
        }
        true
    }

    /// Remove the entry for `key` together with its subscribers.
    ///
    /// Returns `false` if nothing was exposed under `key`.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.lock().remove(key);
        match removed {
            Some(entry) => {
                entry.detach();
                debug!(key = %key, "entry deleted");
                true
            }
            None => false,
        }
    }

    /// Returns `true` if state is exposed under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Remove every entry and every subscriber.
    pub fn clear(&self) {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        debug!(entries = drained.len(), "registry cleared");
        for (_, entry) in drained {
            entry.detach();
        }
    }

    /// All exposed keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Name of the value type exposed under `key`.
    pub fn type_name_of(&self, key: &str) -> Option<&'static str> {
        self.entries.lock().get(key).map(|entry| entry.type_name())
    }

    /// Number of exposed keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is exposed.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Fetch the record of type `T` under `key`, creating it if needed.
    ///
    /// An entry of another type is torn down and replaced. The returned flag
    /// is `true` when a new record was created.
    pub(crate) fn entry_or_insert<T>(
        &self,
        key: &str,
        initial: &T,
    ) -> (Arc<EntryRecord<T>>, bool)
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock();
        let mut replaced = None;
        if let Some(existing) = entries.get(key).cloned() {
            match existing.clone().into_any().downcast::<EntryRecord<T>>() {
                Ok(record) => return (record, false),
                Err(_) => {
                    debug!(
                        key = %key,
                        previous = existing.type_name(),
                        "replacing entry of another type"
                    );
                    replaced = Some(existing);
                }
            }
        }

        let record = EntryRecord::new(key, initial.clone());
        entries.insert(key.to_string(), Arc::clone(&record) as Arc<dyn ErasedEntry>);
        drop(entries);

        if let Some(replaced) = replaced {
            replaced.detach();
        }
        (record, true)
    }

    /// Remove `key` only if it still maps to `record`.
    pub(crate) fn remove_record<T>(&self, key: &str, record: &Arc<EntryRecord<T>>) -> bool
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock();
        let matches = entries.get(key).is_some_and(|current| {
            let record: Arc<dyn ErasedEntry> = Arc::clone(record) as Arc<dyn ErasedEntry>;
            same_record(current, &record)
        });
        if !matches {
            trace!(key = %key, "entry no longer owned, leaving in place");
            return false;
        }
        let removed = entries.remove(key);
        drop(entries);

        if let Some(removed) = removed {
            removed.detach();
        }
        true
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("keys", &self.keys()).finish()
    }
}

fn same_record(a: &Arc<dyn ErasedEntry>, b: &Arc<dyn ErasedEntry>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key_is_none() {
        let registry = Registry::new();
        assert!(registry.get::<i32>("missing").is_none());
        assert!(!registry.has("missing"));
        assert_eq!(
            registry.try_get::<i32>("missing").unwrap_err(),
            RegistryError::NotFound {
                key: "missing".to_string()
            }
        );
    }

    #[test]
    fn get_with_wrong_type_is_mismatch() {
        let registry = Registry::new();
        registry.set("name", ExposedState::new("name", String::from("ada")));

        assert!(registry.get::<i32>("name").is_none());
        let err = registry.try_get::<i32>("name").unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch { .. }));
        assert_eq!(err.key(), "name");
        assert_eq!(
            registry.type_name_of("name"),
            Some(std::any::type_name::<String>())
        );
    }

    #[test]
    fn set_replaces_and_detaches_previous() {
        let registry = Registry::new();
        let first = ExposedState::new("k", 1);
        registry.set("k", first.clone());
        registry.set("k", ExposedState::new("k", 2));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get::<i32>("k").unwrap().state(), 2);
        assert!(!first.is_live());
    }

    #[test]
    fn setting_same_record_keeps_it_live() {
        let registry = Registry::new();
        let entry = ExposedState::new("k", 1);
        registry.set("k", entry.clone());
        registry.set("k", entry.clone());
        assert!(entry.is_live());
    }

    #[test]
    fn set_refuses_detached_or_mismatched_entry() {
        let registry = Registry::new();
        let first = ExposedState::new("k", 1);
        assert!(registry.set("k", first.clone()));
        assert!(registry.delete("k"));

        assert!(!registry.set("k", first.clone()));
        assert!(!registry.has("k"));

        assert!(!registry.set("other", ExposedState::new("k", 2)));
        assert!(!registry.has("other"));
        assert!(registry.is_empty());
    }

    #[test]
    fn delete_removes_entry_and_listeners() {
        let registry = Registry::new();
        let entry = ExposedState::new("k", 1);
        let _sub = entry.subscribe(|_| {});
        registry.set("k", entry.clone());

        assert!(registry.delete("k"));
        assert!(!registry.delete("k"));
        assert!(!registry.has("k"));
        assert_eq!(entry.subscriber_count(), 0);
    }

    #[test]
    fn clear_empties_registry() {
        let registry = Registry::new();
        registry.set("a", ExposedState::new("a", 1));
        registry.set("b", ExposedState::new("b", "two"));
        assert_eq!(registry.keys(), vec!["a".to_string(), "b".to_string()]);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn scope_isolated_from_global() {
        Registry::scope(|| {
            Registry::current().set("scoped-only", ExposedState::new("scoped-only", 0));
            assert!(Registry::current().has("scoped-only"));
        });
        assert!(!Registry::global().has("scoped-only"));
    }

    #[test]
    fn entry_or_insert_reuses_same_type() {
        let registry = Registry::new();
        let (first, created) = registry.entry_or_insert("k", &1);
        assert!(created);
        let (second, created) = registry.entry_or_insert("k", &5);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.state(), 1);
    }

    #[test]
    fn entry_or_insert_replaces_other_type() {
        let registry = Registry::new();
        let (old, _) = registry.entry_or_insert("k", &1u8);
        let (_, created) = registry.entry_or_insert("k", &String::from("x"));
        assert!(created);
        assert!(!old.is_live());
        assert!(registry.get::<String>("k").is_some());
    }

    #[test]
    fn remove_record_ignores_foreign_record() {
        let registry = Registry::new();
        let (record, _) = registry.entry_or_insert("k", &1);
        registry.set("k", ExposedState::new("k", 2));

        assert!(!registry.remove_record("k", &record));
        assert!(registry.has("k"));
    }
}

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::StateCell;
use crate::action::SetStateAction;

type RenderHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A component-owned state slot.
///
/// Every accepted write counts as one re-render of the owning component and
/// runs the registered render hooks with the new value. Clones share the
/// same slot.
///
/// # Failure Modes
///
/// A functional update runs while the slot is write-locked, so it must not
/// read the same slot. Render hooks run after the lock is released and may
/// read or write freely.
pub struct LocalState<T> {
    value: Arc<RwLock<T>>,
    renders: Arc<AtomicU64>,
    hooks: Arc<RwLock<Vec<RenderHook<T>>>>,
}

impl<T> Clone for LocalState<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            renders: Arc::clone(&self.renders),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> LocalState<T> {
    /// Create a new slot with the given initial value.
    pub fn new(initial: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(initial)),
            renders: Arc::new(AtomicU64::new(0)),
            hooks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// The value the component would render with right now.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.value.read();
        f(&value)
    }

    /// Number of re-renders triggered since creation.
    pub fn renders(&self) -> u64 {
        self.renders.load(Ordering::SeqCst)
    }

    /// Run `hook` with the new value after every re-render.
    pub fn on_render<F>(&self, hook: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.hooks.write().push(Arc::new(hook));
    }

    /// Apply a write and re-render. Returns the accepted value.
    pub fn dispatch(&self, action: SetStateAction<T>) -> T {
        let next = {
            let mut value = self.value.write();
            let next = action.resolve(&value);
            *value = next.clone();
            next
        };
        self.renders.fetch_add(1, Ordering::SeqCst);

        let hooks = self.hooks.read().clone();
        for hook in hooks {
            hook(&next);
        }
        next
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.dispatch(SetStateAction::Value(value));
    }

    /// Update the value using a function.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.dispatch(SetStateAction::update(f));
    }
}

impl<T: Clone + Send + Sync + 'static> StateCell<T> for LocalState<T> {
    fn current(&self) -> T {
        self.get()
    }

    fn dispatch(&self, action: SetStateAction<T>) -> T {
        LocalState::dispatch(self, action)
    }
}

impl<T: fmt::Debug> fmt::Debug for LocalState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalState")
            .field("value", &*self.value.read())
            .field("renders", &self.renders.load(Ordering::SeqCst))
            .finish()
    }
}

/// Create a component-local state slot.
///
/// # Example
///
/// ```
/// use exposed_state::use_state;
///
/// let count = use_state(0);
/// count.update(|c| c + 1);
/// assert_eq!(count.get(), 1);
/// assert_eq!(count.renders(), 1);
/// ```
pub fn use_state<T>(initial: T) -> LocalState<T>
where
    T: Clone + Send + Sync + 'static,
{
    LocalState::new(initial)
}

use std::fmt;
use std::sync::Arc;

use crate::action::SetStateAction;

type Commit<T> = Arc<dyn Fn(SetStateAction<T>) + Send + Sync>;

/// Write half of an exposed state cell.
///
/// Cloning shares the same underlying commit function. The setter handed back
/// to the component and the one installed on the registry entry are clones of
/// each other, so [`Setter::ptr_eq`] holds between them.
pub struct Setter<T> {
    commit: Commit<T>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            commit: Arc::clone(&self.commit),
        }
    }
}

impl<T: 'static> Setter<T> {
    pub(crate) fn new<F>(commit: F) -> Self
    where
        F: Fn(SetStateAction<T>) + Send + Sync + 'static,
    {
        Self {
            commit: Arc::new(commit),
        }
    }

    /// Apply a write request.
    pub fn dispatch(&self, action: SetStateAction<T>) {
        (self.commit)(action);
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.dispatch(SetStateAction::Value(value));
    }

    /// Compute the next value from the latest one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.dispatch(SetStateAction::update(f));
    }

    /// Returns `true` when both setters share one commit function.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.commit, &b.commit)
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("commit", &Arc::as_ptr(&self.commit).cast::<()>())
            .finish()
    }
}

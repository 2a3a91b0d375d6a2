//! The bridge between a component-local state cell and the registry.
//!
//! [`expose`] mounts a cell under a key and hands back an [`Exposed`] handle.
//! Its [`Setter`] is the one write path for the key: the entry's
//! `set_state` dispatches through the very same commit function, so local
//! and external writes re-render the owner and notify subscribers alike.

mod bridge;
mod setter;

pub use bridge::Exposed;
pub use setter::Setter;

use crate::host::{default_ids, StateCell};
use crate::registry::Registry;

/// Expose a local state cell in the current registry.
///
/// With `key` set to `None` the entry is keyed by a generated per-mount id.
///
/// # Example
///
/// ```
/// use exposed_state::{expose, use_state, Registry};
///
/// Registry::scope(|| {
///     let count = use_state(0);
///     let exposed = expose(count.clone(), Some("counterA"));
///
///     let (_, set_count) = exposed.state();
///     set_count.update(|c| c + 1);
///
///     let entry = Registry::current().get::<i32>("counterA").unwrap();
///     assert_eq!(entry.state(), 1);
///
///     entry.set(5);
///     assert_eq!(count.get(), 5);
/// });
/// ```
pub fn expose<T, C>(cell: C, key: Option<&str>) -> Exposed<T>
where
    T: Clone + Send + Sync + 'static,
    C: StateCell<T>,
{
    Exposed::mount(cell, key, default_ids(), Registry::current())
}

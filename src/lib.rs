//! # Exposed State
//!
//! Publish component-local reactive state into a process-wide registry so
//! code outside the component tree can read it, write it and subscribe to it.
//!
//! The crate has two halves:
//!
//! ## Registry
//!
//! The externally visible side, reachable without touching any component:
//! - `Registry` - keyed store with `get`, `has`, `set`, `delete` and `clear`
//! - `ExposedState<T>` - one entry: current value, `set_state`, `subscribe`
//! - `Subscription` - handle that removes exactly one callback
//!
//! ## Bridge
//!
//! The component side:
//! - `expose` - wrap a local state cell and register it under a key
//! - `Exposed<T>` - mount handle; dropping it removes the entry
//! - `Setter<T>` - the single write path shared by the component and the entry
//!
//! The `host` module describes what a UI framework has to provide and ships
//! a small implementation (`LocalState`, `SequentialIds`) of it.

pub mod action;
pub mod bridge;
pub mod error;
pub mod host;
pub mod registry;

// Re-export main types for convenience
pub use action::SetStateAction;
pub use bridge::{expose, Exposed, Setter};
pub use error::RegistryError;
pub use host::{default_ids, use_state, IdSource, LocalState, SequentialIds, StateCell};
pub use registry::{ExposedState, ListenerId, Registry, Subscription};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        Registry::scope(|| {
            let exposed = expose(use_state(0), Some("smoke"));
            exposed.setter().set(42);
            assert_eq!(Registry::current().get::<i32>("smoke").unwrap().state(), 42);
        });
    }
}

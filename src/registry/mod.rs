//! Process-wide registry of exposed state.
//!
//! This module provides the externally visible side of the crate: the keyed
//! [`Registry`], the [`ExposedState`] handle for one key, and the observer
//! bookkeeping behind `subscribe`/`unsubscribe`.

mod entry;
mod listeners;
mod registry;

pub(crate) use entry::EntryRecord;
pub use entry::ExposedState;
pub use listeners::{ListenerId, Subscription};
pub use registry::Registry;

//! Capabilities the bridge needs from the hosting UI framework.
//!
//! A host supplies a local state primitive ([`StateCell`]) and a per-mount
//! identifier ([`IdSource`]). Mount and unmount are modelled by the lifetime
//! of the [`Exposed`](crate::Exposed) handle. [`LocalState`] and
//! [`SequentialIds`] are ready-made implementations.

mod ids;
mod state;

pub use ids::{default_ids, IdSource, SequentialIds};
pub use state::{use_state, LocalState};

use crate::action::SetStateAction;

/// A component-owned `(value, setter)` pair.
///
/// `dispatch` must resolve functional updates against the value held at the
/// time of the call, schedule a re-render of the owner, and return the value
/// it accepted.
pub trait StateCell<T>: Send + Sync + 'static {
    fn current(&self) -> T;

    fn dispatch(&self, action: SetStateAction<T>) -> T;
}

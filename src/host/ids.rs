use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Supplies one identifier per mounted component instance.
///
/// Implementations must never hand out the same id twice while the first
/// mount is still alive.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

impl<F> IdSource for F
where
    F: Fn() -> String + Send + Sync,
{
    fn next_id(&self) -> String {
        self()
    }
}

/// Counter-based id source producing `:r0:`, `:r1:`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: Cow<'static, str>,
    suffix: &'static str,
    next: AtomicUsize,
}

impl SequentialIds {
    pub const fn new() -> Self {
        Self {
            prefix: Cow::Borrowed(":r"),
            suffix: ":",
            next: AtomicUsize::new(0),
        }
    }

    /// Ids of the form `{prefix}{n}`.
    pub fn with_prefix(prefix: impl Into<Cow<'static, str>>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: "",
            next: AtomicUsize::new(0),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}{}{}", self.prefix, n, self.suffix)
    }
}

static DEFAULT_IDS: SequentialIds = SequentialIds::new();

/// The process-wide id source used by [`expose`](crate::expose).
pub fn default_ids() -> &'static SequentialIds {
    &DEFAULT_IDS
}

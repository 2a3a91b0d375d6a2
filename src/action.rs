use std::fmt;

/// A write request for a state cell: a literal value or a functional update.
///
/// Functional updates are resolved against whatever value the cell holds at
/// the moment the write is applied, never against a value captured earlier.
pub enum SetStateAction<T> {
    /// Replace the current value.
    Value(T),
    /// Compute the next value from the previous one.
    Update(Box<dyn FnOnce(&T) -> T + Send>),
}

impl<T> SetStateAction<T> {
    /// Create a literal write.
    pub fn value(value: T) -> Self {
        SetStateAction::Value(value)
    }

    /// Create a functional update.
    pub fn update<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        SetStateAction::Update(Box::new(f))
    }

    /// Produce the next value given the previous one.
    pub fn resolve(self, prev: &T) -> T {
        match self {
            SetStateAction::Value(value) => value,
            SetStateAction::Update(f) => f(prev),
        }
    }

    /// Returns `true` for functional updates.
    pub fn is_update(&self) -> bool {
        matches!(self, SetStateAction::Update(_))
    }
}

impl<T: fmt::Debug> fmt::Debug for SetStateAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetStateAction::Value(value) => f.debug_tuple("Value").field(value).finish(),
            SetStateAction::Update(_) => f.write_str("Update(..)"),
        }
    }
}

use thiserror::Error;

/// Reasons a typed registry lookup can come back empty.
///
/// Only [`Registry::try_get`](crate::Registry::try_get) reports these; every
/// other registry operation treats absence as a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no state is exposed under key `{key}`")]
    NotFound { key: String },

    #[error("state exposed under key `{key}` is not of type `{expected}`")]
    TypeMismatch { key: String, expected: &'static str },
}

impl RegistryError {
    /// The key the failed lookup was made with.
    pub fn key(&self) -> &str {
        match self {
            RegistryError::NotFound { key } | RegistryError::TypeMismatch { key, .. } => key,
        }
    }
}

use thiserror::Error;

/// Errors raised by the memoization machinery itself.
///
/// Errors produced by a wrapped function are never converted into this type;
/// they reach the caller unchanged. Functions that can fail and are wrapped
/// with [`try_memoize`](crate::try_memoize) use their own error type, which
/// must implement `From<MemoizeError>` so that key derivation failures can be
/// reported through the same channel.
///
/// # Examples
///
/// ```
/// use memorito_core::{derive_key, MemoizeError};
/// use std::collections::HashMap;
///
/// let mut by_point = HashMap::new();
/// by_point.insert((1, 2), "a");
///
/// // JSON objects need string keys
/// let err = derive_key(&(by_point,)).unwrap_err();
/// assert!(matches!(err, MemoizeError::Serialization(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoizeError {
    /// The argument list could not be turned into a cache key.
    #[error("arguments not serializable, can not be used to memoize: {0}")]
    Serialization(String),

    /// An identity was requested for a value that does not refer to an object.
    #[error("can not assign an identity to a value of type `{type_name}`")]
    InvalidIdentityTarget { type_name: &'static str },

    /// A weak-keyed cache was called with a value that can not be weakly referenced.
    #[error("a value of type `{type_name}` can not be used as a weak key")]
    InvalidWeakKey { type_name: &'static str },
}

impl From<serde_json::Error> for MemoizeError {
    fn from(err: serde_json::Error) -> Self {
        MemoizeError::Serialization(err.to_string())
    }
}

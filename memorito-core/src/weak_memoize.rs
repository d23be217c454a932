//! # Weak-Scoped Memoize
//!
//! Caches the result of a single-argument function for as long as the
//! argument object is alive. Nothing here expires or takes part in global
//! clears; the entry goes away with its key.

use parking_lot::Mutex;
use std::fmt;

use crate::memoize::function_name;
use crate::{MemoizeError, ObjectRef, WeakMap};

/// A function memoized on the identity of its only argument.
///
/// # Examples
///
/// ```
/// use memorito_core::weak_memoize;
/// use std::sync::Arc;
///
/// struct Document {
///     text: String,
/// }
///
/// let word_count = weak_memoize(|doc: &Arc<Document>| doc.text.split_whitespace().count());
///
/// let doc = Arc::new(Document { text: "one two three".into() });
/// assert_eq!(word_count.call(&doc).unwrap(), 3);
/// assert_eq!(word_count.len(), 1);
///
/// drop(doc);
/// assert_eq!(word_count.len(), 0);
/// ```
pub struct WeakMemoized<K, T> {
    func: Box<dyn Fn(&K) -> T + Send + Sync>,
    name: String,
    cache: Mutex<WeakMap<T>>,
}

impl<K, T> WeakMemoized<K, T>
where
    K: ObjectRef,
    T: Clone,
{
    /// Returns the value cached for `key`, computing it on first use.
    ///
    /// # Errors
    ///
    /// [`MemoizeError::InvalidWeakKey`] when `key` does not refer to an object.
    pub fn call(&self, key: &K) -> Result<T, MemoizeError> {
        let handle = key.weak_handle().ok_or(MemoizeError::InvalidWeakKey {
            type_name: key.type_name(),
        })?;

        if let Some(value) = self.cache.lock().get(&handle) {
            return Ok(value.clone());
        }

        tracing::trace!(name = %self.name, addr = handle.addr(), "weak memoize miss");
        let value = (self.func)(key);
        self.cache.lock().insert(handle, value.clone());
        Ok(value)
    }
}

impl<K, T> WeakMemoized<K, T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drops every cached value.
    pub fn reset(&self) {
        self.cache.lock().clear();
        tracing::debug!(name = %self.name, "weak memoize cache reset");
    }

    /// Number of cached values whose key is still alive.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, T> fmt::Debug for WeakMemoized<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMemoized")
            .field("name", &self.name)
            .field("cache", &*self.cache.lock())
            .finish()
    }
}

/// Memoizes `func` on the identity of its argument.
pub fn weak_memoize<K, T, F>(func: F) -> WeakMemoized<K, T>
where
    F: Fn(&K) -> T + Send + Sync + 'static,
{
    WeakMemoized {
        name: function_name::<F>(),
        func: Box::new(func),
        cache: Mutex::new(WeakMap::new()),
    }
}

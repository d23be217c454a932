//! # Weak Association
//!
//! A map whose keys are shared objects (`Arc<T>`) held only through `Weak`
//! references, so an entry never keeps its key alive.
//!
//! Keys are identified by allocation address. While the map holds a `Weak`
//! to an allocation that address can not be handed out to another `Arc`,
//! so a live caller object and a stored key with the same address are always
//! the same object.
//!
//! Entries whose key has been dropped are invisible to lookups and are
//! released by [`WeakMap::purge`], which also runs automatically when an
//! insert finds the map has doubled in size since the previous purge.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Purging is skipped while the map is smaller than this.
const MIN_PURGE_THRESHOLD: usize = 32;

trait Liveness: Send + Sync {
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized + Send + Sync> Liveness for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// A type-erased weak reference to a shared object, usable as a [`WeakMap`] key.
#[derive(Clone)]
pub struct WeakHandle {
    addr: usize,
    type_name: &'static str,
    target: Arc<dyn Liveness>,
}

impl WeakHandle {
    /// Creates a handle that refers to `object` without keeping it alive.
    pub fn new<T>(object: &Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            addr: Arc::as_ptr(object) as *const () as usize,
            type_name: std::any::type_name::<T>(),
            target: Arc::new(Arc::downgrade(object)),
        }
    }

    /// Allocation address of the referenced object.
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Type name of the referenced object.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` while the referenced object has not been dropped.
    pub fn is_alive(&self) -> bool {
        self.target.is_alive()
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("type_name", &self.type_name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// A value that may refer to a shared object with a stable identity.
///
/// Implemented for `Arc<T>` (always an object), `Option<R>` (`None` is not an
/// object), references, and `()` (the absent calling context).
///
/// # Examples
///
/// ```
/// use memorito_core::ObjectRef;
/// use std::sync::Arc;
///
/// let shared = Arc::new(5);
/// assert!(shared.weak_handle().is_some());
/// assert!(None::<Arc<i32>>.weak_handle().is_none());
/// assert!(().weak_handle().is_none());
/// ```
pub trait ObjectRef {
    /// Returns a weak handle to the referenced object, or `None` for values
    /// that do not refer to one.
    fn weak_handle(&self) -> Option<WeakHandle>;

    /// Name used in error messages when [`weak_handle`](Self::weak_handle) is `None`.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T> ObjectRef for Arc<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn weak_handle(&self) -> Option<WeakHandle> {
        Some(WeakHandle::new(self))
    }
}

impl<R: ObjectRef> ObjectRef for Option<R> {
    fn weak_handle(&self) -> Option<WeakHandle> {
        self.as_ref().and_then(ObjectRef::weak_handle)
    }
}

impl<R: ObjectRef + ?Sized> ObjectRef for &R {
    fn weak_handle(&self) -> Option<WeakHandle> {
        (**self).weak_handle()
    }

    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }
}

impl ObjectRef for () {
    fn weak_handle(&self) -> Option<WeakHandle> {
        None
    }
}

struct WeakEntry<V> {
    key: WeakHandle,
    value: V,
}

/// Map from weakly held objects to values.
///
/// # Examples
///
/// ```
/// use memorito_core::{WeakHandle, WeakMap};
/// use std::sync::Arc;
///
/// let mut map = WeakMap::new();
/// let user = Arc::new("alice".to_string());
///
/// map.insert(WeakHandle::new(&user), 42);
/// assert_eq!(map.get(&WeakHandle::new(&user)), Some(&42));
///
/// drop(user);
/// assert_eq!(map.len(), 0);
/// ```
pub struct WeakMap<V> {
    entries: HashMap<usize, WeakEntry<V>>,
    purge_threshold: usize,
}

impl<V> WeakMap<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            purge_threshold: MIN_PURGE_THRESHOLD,
        }
    }

    pub fn get(&self, key: &WeakHandle) -> Option<&V> {
        self.entries
            .get(&key.addr)
            .filter(|entry| entry.key.is_alive())
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &WeakHandle) -> Option<&mut V> {
        self.entries
            .get_mut(&key.addr)
            .filter(|entry| entry.key.is_alive())
            .map(|entry| &mut entry.value)
    }

    pub fn contains_key(&self, key: &WeakHandle) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a value, returning the previous value for the same live key.
    pub fn insert(&mut self, key: WeakHandle, value: V) -> Option<V> {
        self.maybe_purge();
        self.entries
            .insert(key.addr, WeakEntry { key, value })
            .filter(|previous| previous.key.is_alive())
            .map(|previous| previous.value)
    }

    /// Returns the value for `key`, inserting the result of `default` first if absent.
    pub fn get_or_insert_with<F>(&mut self, key: WeakHandle, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        self.maybe_purge();
        match self.entries.entry(key.addr) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().key.is_alive() {
                    occupied.insert(WeakEntry {
                        key,
                        value: default(),
                    });
                }
                &mut occupied.into_mut().value
            }
            Entry::Vacant(vacant) => {
                &mut vacant
                    .insert(WeakEntry {
                        key,
                        value: default(),
                    })
                    .value
            }
        }
    }

    pub fn remove(&mut self, key: &WeakHandle) -> Option<V> {
        self.remove_if(key, |_| true)
    }

    /// Removes the entry for `key` only when `predicate` accepts its value.
    pub fn remove_if<P>(&mut self, key: &WeakHandle, predicate: P) -> Option<V>
    where
        P: FnOnce(&V) -> bool,
    {
        if let Entry::Occupied(occupied) = self.entries.entry(key.addr) {
            if predicate(&occupied.get().value) {
                let removed = occupied.remove();
                return removed.key.is_alive().then_some(removed.value);
            }
        }
        None
    }

    /// Drops every entry whose key is no longer alive. Returns how many were dropped.
    pub fn purge(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.key.is_alive());
        let purged = before - self.entries.len();
        if purged > 0 {
            tracing::trace!(purged, remaining = self.entries.len(), "purged dead weak keys");
        }
        purged
    }

    /// Values whose key is still alive.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries
            .values()
            .filter(|entry| entry.key.is_alive())
            .map(|entry| &entry.value)
    }

    /// Number of entries whose key is still alive.
    pub fn len(&self) -> usize {
        self.values().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.purge_threshold = MIN_PURGE_THRESHOLD;
    }

    fn maybe_purge(&mut self) {
        if self.entries.len() >= self.purge_threshold {
            self.purge();
            self.purge_threshold = (self.entries.len() * 2).max(MIN_PURGE_THRESHOLD);
        }
    }
}

impl<V> Default for WeakMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for WeakMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMap")
            .field("live", &self.len())
            .field("stored", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_object_same_entry() {
        let mut map = WeakMap::new();
        let obj = Arc::new(String::from("obj"));

        map.insert(WeakHandle::new(&obj), 1);
        assert_eq!(map.get(&WeakHandle::new(&obj)), Some(&1));

        let alias = Arc::clone(&obj);
        assert_eq!(map.get(&WeakHandle::new(&alias)), Some(&1));
    }

    #[test]
    fn test_equal_but_distinct_objects() {
        let mut map = WeakMap::new();
        let a = Arc::new(String::from("same"));
        let b = Arc::new(String::from("same"));

        map.insert(WeakHandle::new(&a), "a");
        assert!(map.get(&WeakHandle::new(&b)).is_none());
    }

    #[test]
    fn test_does_not_keep_key_alive() {
        let mut map = WeakMap::new();
        let obj = Arc::new(7u32);
        let handle = WeakHandle::new(&obj);

        map.insert(handle.clone(), ());
        assert_eq!(Arc::strong_count(&obj), 1);

        drop(obj);
        assert!(!handle.is_alive());
        assert!(map.is_empty());
        assert!(map.get(&handle).is_none());
    }

    #[test]
    fn test_purge_releases_values() {
        let mut map = WeakMap::new();
        let value = Arc::new(());
        let obj = Arc::new(1u8);

        map.insert(WeakHandle::new(&obj), Arc::clone(&value));
        assert_eq!(Arc::strong_count(&value), 2);

        drop(obj);
        assert_eq!(map.purge(), 1);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn test_automatic_purge_on_growth() {
        let mut map = WeakMap::new();
        for i in 0..(MIN_PURGE_THRESHOLD * 4) {
            let obj = Arc::new(i);
            map.insert(WeakHandle::new(&obj), i);
        }
        // Every key died right after insertion
        assert!(map.entries.len() <= MIN_PURGE_THRESHOLD);
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut map = WeakMap::new();
        let obj = Arc::new(());

        *map.get_or_insert_with(WeakHandle::new(&obj), || 0) += 1;
        *map.get_or_insert_with(WeakHandle::new(&obj), || 0) += 1;
        assert_eq!(map.get(&WeakHandle::new(&obj)), Some(&2));
    }

    #[test]
    fn test_remove_if() {
        let mut map = WeakMap::new();
        let obj = Arc::new(());
        let handle = WeakHandle::new(&obj);

        map.insert(handle.clone(), 3);
        assert_eq!(map.remove_if(&handle, |v| *v == 4), None);
        assert_eq!(map.remove_if(&handle, |v| *v == 3), Some(3));
        assert!(map.is_empty());
    }

    #[test]
    fn test_unsized_targets() {
        let f: Arc<dyn Fn() -> u32 + Send + Sync> = Arc::new(|| 1);
        let handle = f.weak_handle().expect("closure is an object");
        assert!(handle.is_alive());
    }
}

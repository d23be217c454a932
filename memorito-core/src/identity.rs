//! # Object Identity Registry
//!
//! Hands out a unique, stable identity string per shared object. Used by the
//! key deriver to stand in for values that compare by identity rather than
//! by content.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{MemoizeError, ObjectRef, WeakMap};

static GLOBAL_REGISTRY: Lazy<IdentityRegistry> = Lazy::new(IdentityRegistry::new);

/// Sequence shared by every registry so tokens never repeat within a process.
static NEXT_UID: AtomicU64 = AtomicU64::new(0);

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Weak association from objects to identity strings.
///
/// # Examples
///
/// ```
/// use memorito_core::IdentityRegistry;
/// use std::sync::Arc;
///
/// let registry = IdentityRegistry::new();
/// let handler = Arc::new(|| 42);
///
/// let first = registry.id_of(&handler).unwrap();
/// let second = registry.id_of(&handler).unwrap();
/// assert_eq!(first, second);
///
/// let other = Arc::new(|| 42);
/// assert_ne!(first, registry.id_of(&other).unwrap());
/// ```
pub struct IdentityRegistry {
    ids: Mutex<WeakMap<String>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            ids: Mutex::new(WeakMap::new()),
        }
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static IdentityRegistry {
        &GLOBAL_REGISTRY
    }

    /// Returns the identity of `object`, allocating one on first request.
    ///
    /// # Errors
    ///
    /// [`MemoizeError::InvalidIdentityTarget`] when `object` does not refer
    /// to a shared object (`None`, `()`).
    pub fn id_of<R>(&self, object: &R) -> Result<String, MemoizeError>
    where
        R: ObjectRef + ?Sized,
    {
        let handle = object
            .weak_handle()
            .ok_or(MemoizeError::InvalidIdentityTarget {
                type_name: object.type_name(),
            })?;

        let mut ids = self.ids.lock();
        let type_name = handle.type_name();
        let id = ids.get_or_insert_with(handle, || {
            let id = format!("{}:{}", type_name, unique_id());
            tracing::debug!(%id, "allocated object identity");
            id
        });
        Ok(id.clone())
    }

    /// Number of live objects that currently hold an identity.
    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for [`IdentityRegistry::global`]`().id_of(object)`.
pub fn id_of<R>(object: &R) -> Result<String, MemoizeError>
where
    R: ObjectRef + ?Sized,
{
    IdentityRegistry::global().id_of(object)
}

/// `uid_<10 random hex digits>_<sequence>`
fn unique_id() -> String {
    let random: String = (0..10)
        .map(|_| HEX[fastrand::usize(..HEX.len())] as char)
        .collect();
    let seq = NEXT_UID.fetch_add(1, Ordering::Relaxed);
    format!("uid_{}_{:x}", random, seq)
}

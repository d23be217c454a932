//! # Weak-Scoped Async Memoize
//!
//! Shares the pending computation for an argument object between callers.
//! The entry is keyed weakly by the argument and removed once the
//! computation settles.

use futures::future::{BoxFuture, FutureExt};
use memorito_core::{function_name_of, MemoizeError, ObjectRef, WeakMap};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::pending::{next_token, settle_with, InFlight, Pending};

type BoxedAsyncFn<K, T, E> = Box<dyn Fn(&K) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

struct Inner<K, T, E> {
    func: BoxedAsyncFn<K, T, E>,
    pending: Mutex<WeakMap<Pending<T, E>>>,
}

/// An async function whose in-flight calls are shared per argument object.
///
/// # Examples
///
/// ```
/// use memorito_async::{weak_memoize_async, MemoizeError};
/// use std::sync::Arc;
///
/// struct Session {
///     user: String,
/// }
///
/// # futures::executor::block_on(async {
/// let greet = weak_memoize_async(|session: &Arc<Session>| {
///     let session = Arc::clone(session);
///     async move { Ok::<_, MemoizeError>(format!("hello {}", session.user)) }
/// });
///
/// let session = Arc::new(Session { user: "ana".into() });
/// let a = greet.call(&session).unwrap();
/// let b = greet.call(&session).unwrap();
/// assert_eq!(greet.len(), 1);
///
/// assert_eq!(a.await.unwrap(), "hello ana");
/// assert_eq!(b.await.unwrap(), "hello ana");
/// assert!(greet.is_empty());
/// # });
/// ```
pub struct WeakMemoizedAsync<K, T, E = MemoizeError> {
    inner: Arc<Inner<K, T, E>>,
    name: String,
}

impl<K, T, E> WeakMemoizedAsync<K, T, E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forgets every pending computation without cancelling it.
    pub fn reset(&self) {
        self.inner.pending.lock().clear();
        tracing::debug!(name = %self.name, "weak async memoize cache reset");
    }

    /// Number of pending computations whose argument is still alive.
    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, T, E> WeakMemoizedAsync<K, T, E>
where
    K: ObjectRef + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Returns the in-flight computation for `key`, starting one if none is pending.
    ///
    /// # Errors
    ///
    /// [`MemoizeError::InvalidWeakKey`] when `key` does not refer to an object.
    pub fn call(&self, key: &K) -> Result<InFlight<T, E>, MemoizeError> {
        let handle = key.weak_handle().ok_or(MemoizeError::InvalidWeakKey {
            type_name: key.type_name(),
        })?;

        if let Some(pending) = self.inner.pending.lock().get(&handle) {
            return Ok(pending.future.clone());
        }

        let token = next_token();
        let owner = Arc::downgrade(&self.inner);
        let evict = handle.clone();
        let future = settle_with((self.inner.func)(key), move |ok| {
            if let Some(inner) = owner.upgrade() {
                inner
                    .pending
                    .lock()
                    .remove_if(&evict, |pending| pending.token == token);
            }
            tracing::trace!(addr = evict.addr(), ok, "weak in-flight computation settled");
        });

        let mut pending = self.inner.pending.lock();
        if let Some(existing) = pending.get(&handle) {
            return Ok(existing.future.clone());
        }
        tracing::trace!(name = %self.name, addr = handle.addr(), "started weak computation");
        pending.insert(
            handle,
            Pending {
                token,
                future: future.clone(),
            },
        );
        Ok(future)
    }
}

impl<K, T, E> fmt::Debug for WeakMemoizedAsync<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMemoizedAsync")
            .field("name", &self.name)
            .field("pending", &self.len())
            .finish()
    }
}

/// Memoizes an async function on the identity of its argument.
///
/// The returned future must be `'static`; clone the `Arc` into it when the
/// computation needs the argument.
pub fn weak_memoize_async<K, T, E, F, Fut>(func: F) -> WeakMemoizedAsync<K, T, E>
where
    K: 'static,
    T: 'static,
    E: 'static,
    F: Fn(&K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let name = function_name_of(&func);
    WeakMemoizedAsync {
        inner: Arc::new(Inner {
            func: Box::new(move |key: &K| func(key).boxed()),
            pending: Mutex::new(WeakMap::new()),
        }),
        name,
    }
}

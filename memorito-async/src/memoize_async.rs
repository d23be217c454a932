//! # Async Memoize
//!
//! Caches *pending* computations. Callers that ask for the same arguments
//! while a computation is in flight share it; as soon as it settles, with a
//! value or an error, the entry is evicted and the next call starts over.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use memorito_core::{derive_key, function_name_of, MemoizeError};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::pending::{next_token, settle_with, InFlight, Pending};

type BoxedAsyncFn<A, T, E> = Box<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

struct Inner<A, T, E> {
    func: BoxedAsyncFn<A, T, E>,
    pending: DashMap<String, Pending<T, E>>,
}

/// An async function whose in-flight calls are shared.
///
/// `call` invokes the wrapped function right away; the future it returns runs
/// when first polled. An entry that is never polled stays pending until
/// [`reset`](Self::reset).
///
/// # Examples
///
/// ```
/// use memorito_async::{memoize_async, MemoizeError};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// # futures::executor::block_on(async {
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&calls);
/// let fetch = memoize_async(move |(id,): (u32,)| {
///     counter.fetch_add(1, Ordering::SeqCst);
///     async move { Ok::<_, MemoizeError>(id * 100) }
/// });
///
/// let first = fetch.call((7,)).unwrap();
/// let second = fetch.call((7,)).unwrap();
/// assert_eq!(fetch.pending(), 1);
///
/// assert_eq!(first.await.unwrap(), 700);
/// assert_eq!(second.await.unwrap(), 700);
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// assert_eq!(fetch.pending(), 0);
/// # });
/// ```
pub struct AsyncMemoized<A, T, E = MemoizeError> {
    inner: Arc<Inner<A, T, E>>,
    name: String,
}

impl<A, T, E> AsyncMemoized<A, T, E> {
    /// Replaces the diagnostic name derived from the wrapped function.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"<name>::promiseMemoized"`
    pub fn display_name(&self) -> String {
        format!("{}::promiseMemoized", self.name)
    }

    /// Forgets every pending computation. Computations already started keep
    /// running and their callers still receive the result.
    pub fn reset(&self) {
        self.inner.pending.clear();
        tracing::debug!(name = %self.name, "async memoized cache reset");
    }

    /// Number of computations currently shared.
    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }
}

impl<A, T, E> AsyncMemoized<A, T, E>
where
    A: Serialize + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Returns the in-flight computation for `args`, starting one if none is pending.
    ///
    /// # Errors
    ///
    /// [`MemoizeError::Serialization`] when `args` can not be turned into a
    /// key. Nothing is invoked in that case. Errors of the wrapped function
    /// are delivered through the returned future.
    pub fn call(&self, args: A) -> Result<InFlight<T, E>, MemoizeError> {
        let key = derive_key(&args)?;

        if let Some(pending) = self.inner.pending.get(&key) {
            tracing::trace!(name = %self.name, %key, "joined in-flight computation");
            return Ok(pending.future.clone());
        }

        let token = next_token();
        let owner = Arc::downgrade(&self.inner);
        let evict_key = key.clone();
        let future = settle_with((self.inner.func)(args), move |ok| {
            if let Some(inner) = owner.upgrade() {
                inner
                    .pending
                    .remove_if(&evict_key, |_, pending| pending.token == token);
            }
            tracing::trace!(key = %evict_key, ok, "in-flight computation settled");
        });

        match self.inner.pending.entry(key) {
            Entry::Occupied(occupied) => Ok(occupied.get().future.clone()),
            Entry::Vacant(vacant) => {
                tracing::trace!(name = %self.name, key = %vacant.key(), "started computation");
                vacant.insert(Pending {
                    token,
                    future: future.clone(),
                });
                Ok(future)
            }
        }
    }
}

impl<A, T, E> fmt::Debug for AsyncMemoized<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncMemoized")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Memoizes an async function returning `Result`.
pub fn memoize_async<A, T, E, F, Fut>(func: F) -> AsyncMemoized<A, T, E>
where
    A: 'static,
    T: 'static,
    E: 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let name = function_name_of(&func);
    AsyncMemoized {
        inner: Arc::new(Inner {
            func: Box::new(move |args| func(args).boxed()),
            pending: DashMap::new(),
        }),
        name,
    }
}

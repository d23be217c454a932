//! # Memoize Engine
//!
//! Wraps a function so repeated calls with equivalent arguments return a
//! stored result. Caching is either shared by every caller or partitioned by
//! the calling context (`this_namespace`), entries may expire after a TTL, and
//! each wrapper can be reset individually or invalidated in bulk through the
//! [`GenerationCounter`].

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

#[cfg(feature = "stats")]
use std::sync::Arc;

#[cfg(feature = "stats")]
use crate::{stats_registry, CacheStats};

use crate::{derive_key, CacheEntry, GenerationCounter, MemoizeError, ObjectRef, WeakHandle, WeakMap};

type Bucket<T> = HashMap<String, CacheEntry<T>>;

type BoxedFn<C, A, T, E> = Box<dyn Fn(&C, A) -> Result<T, E> + Send + Sync>;

/// Configuration for a memoized function.
///
/// # Examples
///
/// ```
/// use memorito_core::MemoizeOptions;
/// use std::time::Duration;
///
/// let options = MemoizeOptions::new()
///     .name("load_profile")
///     .time(Duration::from_secs(30))
///     .this_namespace(true);
///
/// assert_eq!(options.get_name(), Some("load_profile"));
/// assert_eq!(options.get_time(), Some(Duration::from_secs(30)));
/// ```
#[derive(Clone)]
pub struct MemoizeOptions {
    name: Option<String>,
    time: Option<Duration>,
    this_namespace: bool,
    generations: &'static GenerationCounter,
}

impl MemoizeOptions {
    pub fn new() -> Self {
        Self {
            name: None,
            time: None,
            this_namespace: false,
            generations: GenerationCounter::global(),
        }
    }

    /// Diagnostic name. Named wrappers also publish their statistics in
    /// [`stats_registry`](crate::stats_registry) when the `stats` feature is on.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Time-to-live of each entry.
    pub fn time(mut self, ttl: Duration) -> Self {
        self.time = Some(ttl);
        self
    }

    /// Partition the cache by calling context instead of sharing one bucket.
    pub fn this_namespace(mut self, enabled: bool) -> Self {
        self.this_namespace = enabled;
        self
    }

    /// Use `counter` instead of the process-wide generation counter.
    pub fn generations(mut self, counter: &'static GenerationCounter) -> Self {
        self.generations = counter;
        self
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get_time(&self) -> Option<Duration> {
        self.time
    }

    pub fn is_this_namespace(&self) -> bool {
        self.this_namespace
    }
}

impl Default for MemoizeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoizeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizeOptions")
            .field("name", &self.name)
            .field("time", &self.time)
            .field("this_namespace", &self.this_namespace)
            .finish()
    }
}

struct MemoState<T> {
    generation: u64,
    /// Bumped whenever the buckets are dropped, so results computed across a
    /// reset are not written into the fresh cache.
    epoch: u64,
    simple: Option<Bucket<T>>,
    per_instance: Option<WeakMap<Bucket<T>>>,
}

impl<T> MemoState<T> {
    fn bucket_mut(&mut self, scope: Option<&WeakHandle>) -> &mut Bucket<T> {
        match scope {
            Some(handle) => self
                .per_instance
                .get_or_insert_with(WeakMap::new)
                .get_or_insert_with(handle.clone(), HashMap::new),
            None => self.simple.get_or_insert_with(HashMap::new),
        }
    }

    fn invalidate(&mut self) {
        self.simple = None;
        self.per_instance = None;
        self.epoch += 1;
    }

    fn len(&self) -> usize {
        let simple = self.simple.as_ref().map_or(0, HashMap::len);
        let scoped = self
            .per_instance
            .as_ref()
            .map_or(0, |buckets| buckets.values().map(HashMap::len).sum());
        simple + scoped
    }
}

/// A memoized function.
///
/// * `C` - calling context; `()` for plain functions
/// * `A` - argument tuple, used to derive the cache key
/// * `T` - cached result
/// * `E` - error type of the wrapped function; `Err` results are never cached
///
/// # Examples
///
/// ```
/// use memorito_core::memoize;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&calls);
/// let square = memoize(move |(x,): (u64,)| {
///     counter.fetch_add(1, Ordering::SeqCst);
///     x * x
/// });
///
/// assert_eq!(square.call((4,)).unwrap(), 16);
/// assert_eq!(square.call((4,)).unwrap(), 16);
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
///
/// square.reset();
/// square.call((4,)).unwrap();
/// assert_eq!(calls.load(Ordering::SeqCst), 2);
/// ```
pub struct Memoized<C, A, T, E = MemoizeError> {
    func: BoxedFn<C, A, T, E>,
    name: String,
    ttl: Option<Duration>,
    this_namespace: bool,
    generations: &'static GenerationCounter,
    state: Mutex<MemoState<T>>,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

impl<C, A, T, E> Memoized<C, A, T, E> {
    fn from_parts(func: BoxedFn<C, A, T, E>, default_name: String, options: MemoizeOptions) -> Self {
        let generations = options.generations;
        let name = options.name.clone().unwrap_or(default_name);

        #[cfg(feature = "stats")]
        let stats = Arc::new(CacheStats::new());
        #[cfg(feature = "stats")]
        {
            if options.name.is_some() {
                stats_registry::register(&name, &stats);
            }
        }

        Self {
            func,
            name,
            ttl: options.time,
            this_namespace: options.this_namespace,
            generations,
            state: Mutex::new(MemoState {
                generation: generations.allocate(),
                epoch: 0,
                simple: None,
                per_instance: None,
            }),
            #[cfg(feature = "stats")]
            stats,
        }
    }

    /// Diagnostic name given in the options, or derived from the function.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"<name>::memoized"`
    pub fn display_name(&self) -> String {
        format!("{}::memoized", self.name)
    }

    /// Generation index the wrapper is currently stamped with.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Drops every cached entry, shared and per-context.
    pub fn reset(&self) {
        self.state.lock().invalidate();
        #[cfg(feature = "stats")]
        self.stats.record_invalidation();
        tracing::debug!(name = %self.name, "memoized cache reset");
    }

    /// Number of stored entries across all buckets, expired ones included.
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn refresh_generation(&self, state: &mut MemoState<T>) {
        if self.generations.is_stale(state.generation) {
            state.invalidate();
            state.generation = self.generations.allocate();
            #[cfg(feature = "stats")]
            self.stats.record_invalidation();
            tracing::debug!(
                name = %self.name,
                generation = state.generation,
                "memoized cache dropped after global clear"
            );
        }
    }
}

impl<C, A, T, E> Memoized<C, A, T, E>
where
    C: ObjectRef,
    A: Serialize,
    T: Clone,
    E: From<MemoizeError>,
{
    /// Calls the wrapped function with an explicit calling context.
    ///
    /// With `this_namespace` the context selects the cache bucket and must
    /// refer to an object; otherwise it is only passed through.
    ///
    /// # Errors
    ///
    /// * [`MemoizeError::InvalidWeakKey`] if `this_namespace` is set and `ctx` is not an object
    /// * [`MemoizeError::Serialization`] if `args` can not be turned into a key
    /// * any error returned by the wrapped function, unchanged
    pub fn call_on(&self, ctx: &C, args: A) -> Result<T, E> {
        let scope = if self.this_namespace {
            let handle = ctx.weak_handle().ok_or(MemoizeError::InvalidWeakKey {
                type_name: ctx.type_name(),
            })?;
            Some(handle)
        } else {
            None
        };
        let key = derive_key(&args)?;

        let epoch = {
            let mut state = self.state.lock();
            self.refresh_generation(&mut state);
            let epoch = state.epoch;
            let bucket = state.bucket_mut(scope.as_ref());

            let expired = match bucket.get(&key) {
                Some(entry) if !entry.is_expired(self.ttl) => {
                    #[cfg(feature = "stats")]
                    self.stats.record_hit();
                    tracing::trace!(name = %self.name, %key, "memoize hit");
                    return Ok(entry.value.clone());
                }
                Some(_) => true,
                None => false,
            };
            if expired {
                bucket.remove(&key);
                #[cfg(feature = "stats")]
                self.stats.record_expiration();
            }
            epoch
        };

        #[cfg(feature = "stats")]
        self.stats.record_miss();
        tracing::trace!(name = %self.name, %key, "memoize miss");

        let value = (self.func)(ctx, args)?;

        let mut state = self.state.lock();
        if state.epoch == epoch && !self.generations.is_stale(state.generation) {
            state
                .bucket_mut(scope.as_ref())
                .insert(key, CacheEntry::new(value.clone()));
        }
        Ok(value)
    }
}

impl<A, T, E> Memoized<(), A, T, E>
where
    A: Serialize,
    T: Clone,
    E: From<MemoizeError>,
{
    /// Calls a wrapper that has no calling context.
    pub fn call(&self, args: A) -> Result<T, E> {
        self.call_on(&(), args)
    }
}

impl<C, A, T, E> fmt::Debug for Memoized<C, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("this_namespace", &self.this_namespace)
            .field("generation", &self.generation())
            .finish()
    }
}

/// Memoizes `func` with default options.
pub fn memoize<A, T, F>(func: F) -> Memoized<(), A, T>
where
    A: 'static,
    T: 'static,
    F: Fn(A) -> T + Send + Sync + 'static,
{
    memoize_with(func, MemoizeOptions::default())
}

/// Memoizes `func` with the given options.
pub fn memoize_with<A, T, F>(func: F, options: MemoizeOptions) -> Memoized<(), A, T>
where
    A: 'static,
    T: 'static,
    F: Fn(A) -> T + Send + Sync + 'static,
{
    let name = function_name::<F>();
    Memoized::from_parts(Box::new(move |_: &(), args: A| Ok(func(args))), name, options)
}

/// Memoizes a fallible function. `Ok` values are cached, `Err` values are
/// returned to the caller and the next call runs the function again.
///
/// # Examples
///
/// ```
/// use memorito_core::{try_memoize, MemoizeError, MemoizeOptions};
///
/// #[derive(Debug)]
/// enum LookupError {
///     Missing,
///     Key(MemoizeError),
/// }
///
/// impl From<MemoizeError> for LookupError {
///     fn from(err: MemoizeError) -> Self {
///         LookupError::Key(err)
///     }
/// }
///
/// let lookup = try_memoize(
///     |(id,): (u32,)| if id == 0 { Err(LookupError::Missing) } else { Ok(id * 10) },
///     MemoizeOptions::new(),
/// );
///
/// assert_eq!(lookup.call((3,)).unwrap(), 30);
/// assert!(matches!(lookup.call((0,)), Err(LookupError::Missing)));
/// assert_eq!(lookup.len(), 1);
/// ```
pub fn try_memoize<A, T, E, F>(func: F, options: MemoizeOptions) -> Memoized<(), A, T, E>
where
    A: 'static,
    T: 'static,
    E: 'static,
    F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
{
    let name = function_name::<F>();
    Memoized::from_parts(Box::new(move |_: &(), args: A| func(args)), name, options)
}

/// Memoizes a function that receives an explicit calling context.
///
/// # Examples
///
/// ```
/// use memorito_core::{memoize_method, MemoizeOptions};
/// use std::sync::Arc;
///
/// struct Account {
///     balance: u64,
/// }
///
/// let doubled = memoize_method(
///     |account: &Arc<Account>, (): ()| account.balance * 2,
///     MemoizeOptions::new().this_namespace(true),
/// );
///
/// let a = Arc::new(Account { balance: 5 });
/// let b = Arc::new(Account { balance: 7 });
/// assert_eq!(doubled.call_on(&a, ()).unwrap(), 10);
/// assert_eq!(doubled.call_on(&b, ()).unwrap(), 14);
/// ```
pub fn memoize_method<C, A, T, F>(func: F, options: MemoizeOptions) -> Memoized<C, A, T>
where
    C: 'static,
    A: 'static,
    T: 'static,
    F: Fn(&C, A) -> T + Send + Sync + 'static,
{
    let name = function_name::<F>();
    Memoized::from_parts(Box::new(move |ctx: &C, args: A| Ok(func(ctx, args))), name, options)
}

/// Fallible counterpart of [`memoize_method`].
pub fn try_memoize_method<C, A, T, E, F>(func: F, options: MemoizeOptions) -> Memoized<C, A, T, E>
where
    C: 'static,
    A: 'static,
    T: 'static,
    E: 'static,
    F: Fn(&C, A) -> Result<T, E> + Send + Sync + 'static,
{
    let name = function_name::<F>();
    Memoized::from_parts(Box::new(func), name, options)
}

/// Invalidates every memoized function created so far through the global
/// [`GenerationCounter`]. Wrappers drop their caches lazily, on their next call.
pub fn clear_all() {
    GenerationCounter::global().invalidate_all();
}

/// Short name of a function type, `"anonymous"` for closures.
pub(crate) fn function_name<F: ?Sized>() -> String {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") || full.starts_with("fn(") || full.starts_with("dyn ") {
        return "anonymous".to_string();
    }
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn isolated() -> MemoizeOptions {
        MemoizeOptions::new().generations(Box::leak(Box::new(GenerationCounter::new())))
    }

    fn counting(calls: &Arc<AtomicUsize>) -> impl Fn((u32,)) -> u32 + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |(n,)| {
            calls.fetch_add(1, Ordering::SeqCst);
            n + 1
        }
    }

    fn double(x: u32) -> u32 {
        x * 2
    }

    #[test]
    fn test_function_name() {
        assert_eq!(function_name::<fn(u32) -> u32>(), "anonymous");
        assert_eq!(function_name_of(&double), "double");
        assert_eq!(function_name_of(&|x: u32| x), "anonymous");
    }

    fn function_name_of<F>(_: &F) -> String {
        function_name::<F>()
    }

    #[test]
    fn test_default_and_custom_name() {
        let unnamed = memoize_with(double, isolated());
        assert_eq!(unnamed.name(), "double");
        assert_eq!(unnamed.display_name(), "double::memoized");

        let named = memoize_with(double, isolated().name("doubler"));
        assert_eq!(named.name(), "doubler");
    }

    #[test]
    fn test_unit_results_are_hits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let touch = memoize_with(
            move |(): ()| {
                c.fetch_add(1, Ordering::SeqCst);
            },
            isolated(),
        );

        for _ in 0..5 {
            touch.call(()).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let add = memoize_with(counting(&calls), isolated().time(Duration::from_millis(50)));

        add.call((1,)).unwrap();
        add.call((1,)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        thread::sleep(Duration::from_millis(80));
        add.call((1,)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(add.len(), 1);
    }

    #[test]
    fn test_isolated_generation_clear() {
        let counter: &'static GenerationCounter = Box::leak(Box::new(GenerationCounter::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let add = memoize_with(counting(&calls), MemoizeOptions::new().generations(counter));

        add.call((1,)).unwrap();
        counter.invalidate_all();
        add.call((1,)).unwrap();
        add.call((1,)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!counter.is_stale(add.generation()));
    }

    #[test]
    fn test_this_namespace_requires_object_context() {
        let add = memoize_with(double, isolated().this_namespace(true));
        assert_eq!(
            add.call(2),
            Err(MemoizeError::InvalidWeakKey { type_name: "()" })
        );
    }

    #[test]
    fn test_context_passed_through_without_namespace() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let label = memoize_method(
            move |ctx: &Arc<String>, (): ()| {
                c.fetch_add(1, Ordering::SeqCst);
                ctx.to_uppercase()
            },
            isolated(),
        );

        let a = Arc::new("a".to_string());
        let b = Arc::new("b".to_string());
        assert_eq!(label.call_on(&a, ()).unwrap(), "A");
        // Shared bucket: the first context's result is returned
        assert_eq!(label.call_on(&b, ()).unwrap(), "A");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_per_instance_buckets_follow_context_lifetime() {
        let label = memoize_method(
            |ctx: &Arc<String>, (): ()| ctx.len(),
            isolated().this_namespace(true),
        );

        let a = Arc::new("abc".to_string());
        label.call_on(&a, ()).unwrap();
        assert_eq!(label.len(), 1);

        drop(a);
        assert_eq!(label.len(), 0);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let flaky = try_memoize(
            move |(): ()| {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(MemoizeError::Serialization("boom".into()))
                } else {
                    Ok(7)
                }
            },
            isolated(),
        );

        assert!(flaky.call(()).is_err());
        assert_eq!(flaky.call(()).unwrap(), 7);
        assert_eq!(flaky.call(()).unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_serialization_error_propagates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let sum = memoize_with(
            move |(map,): (HashMap<Vec<u8>, u32>,)| {
                c.fetch_add(1, Ordering::SeqCst);
                map.values().sum::<u32>()
            },
            isolated(),
        );

        let mut map = HashMap::new();
        map.insert(vec![1], 1);
        assert!(matches!(sum.call((map,)), Err(MemoizeError::Serialization(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reset_during_computation_discards_result() {
        let slot: Arc<Mutex<Option<Arc<Memoized<(), (), u32>>>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let memo = Arc::new(memoize_with(
            move |(): ()| {
                if let Some(memo) = inner.lock().as_ref() {
                    memo.reset();
                }
                1
            },
            isolated(),
        ));
        *slot.lock() = Some(Arc::clone(&memo));

        assert_eq!(memo.call(()).unwrap(), 1);
        assert!(memo.is_empty());
        slot.lock().take();
    }

    #[cfg(feature = "stats")]
    #[test]
    fn test_stats_track_hits_and_misses() {
        let add = memoize_with(double, isolated().time(Duration::from_millis(20)));
        add.call(1).unwrap();
        add.call(1).unwrap();
        add.call(2).unwrap();
        thread::sleep(Duration::from_millis(40));
        add.call(1).unwrap();
        add.reset();

        assert_eq!(add.stats().hits(), 1);
        assert_eq!(add.stats().misses(), 3);
        assert_eq!(add.stats().expirations(), 1);
        assert_eq!(add.stats().invalidations(), 1);
    }
}

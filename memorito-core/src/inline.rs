//! # Inline Memoize
//!
//! Lets a function memoize its own result without a wrapper threaded through
//! its call sites. Results live in a process-wide side table keyed by the
//! function's identity: every Rust function item and closure has a distinct
//! type, so its `TypeId` names it for as long as the program runs.
//!
//! Pass the function item itself (`&my_fn`), not a `fn` pointer: all `fn`
//! pointers with the same signature share one type and therefore one table.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::memoize::function_name;
use crate::{derive_key, MemoizeError};

/// (function identity, result type) → `HashMap<String, T>`
type InlineTables = HashMap<(TypeId, TypeId), Box<dyn Any + Send>>;

static INLINE_TABLES: Lazy<Mutex<InlineTables>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns the result stored for `identity` and `args`, running `computation`
/// and storing its result on a miss.
///
/// The table is written only after `computation` returns; a recursive call
/// with the same arguments made from inside `computation` recomputes.
///
/// # Errors
///
/// [`MemoizeError::Serialization`] when `args` can not be turned into a key.
///
/// # Examples
///
/// ```
/// use memorito_core::inline_memoize;
///
/// fn fib(n: u64) -> u64 {
///     inline_memoize(&fib, &(n,), || if n < 2 { n } else { fib(n - 1) + fib(n - 2) })
///         .unwrap()
/// }
///
/// assert_eq!(fib(80), 23_416_728_348_467_685);
/// ```
pub fn inline_memoize<F, A, T, C>(identity: &F, args: &A, computation: C) -> Result<T, MemoizeError>
where
    F: ?Sized + 'static,
    A: Serialize + ?Sized,
    T: Clone + Send + 'static,
    C: FnOnce() -> T,
{
    let _ = identity;
    let slot = (TypeId::of::<F>(), TypeId::of::<T>());
    let key = derive_key(args)?;

    {
        let tables = INLINE_TABLES.lock();
        let hit = tables
            .get(&slot)
            .and_then(|table| table.downcast_ref::<HashMap<String, T>>())
            .and_then(|table| table.get(&key));
        if let Some(value) = hit {
            return Ok(value.clone());
        }
    }

    tracing::trace!(function = %function_name::<F>(), %key, "inline memoize miss");
    let value = computation();

    let mut tables = INLINE_TABLES.lock();
    let table = tables
        .entry(slot)
        .or_insert_with(|| Box::new(HashMap::<String, T>::new()));
    if let Some(table) = table.downcast_mut::<HashMap<String, T>>() {
        table.insert(key, value.clone());
    }
    Ok(value)
}

/// [`inline_memoize`] for a function without arguments.
pub fn inline_memoize_once<F, T, C>(identity: &F, computation: C) -> Result<T, MemoizeError>
where
    F: ?Sized + 'static,
    T: Clone + Send + 'static,
    C: FnOnce() -> T,
{
    inline_memoize(identity, &(), computation)
}

/// Drops every result stored for `identity`. Returns `false` if there were none.
pub fn clear_inline<F>(identity: &F) -> bool
where
    F: ?Sized + 'static,
{
    let _ = identity;
    let id = TypeId::of::<F>();
    let mut tables = INLINE_TABLES.lock();
    let before = tables.len();
    tables.retain(|(function, _), _| *function != id);
    let cleared = tables.len() != before;
    if cleared {
        tracing::debug!(function = %function_name::<F>(), "inline memoize table cleared");
    }
    cleared
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_self_memoized_function() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        fn add() {
            inline_memoize_once(&add, || {
                COUNTER.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        }

        for _ in 0..5 {
            add();
        }
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_self_memoized_function_with_parameter() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        fn add(number: usize) {
            inline_memoize(&add, &(number,), || {
                COUNTER.fetch_add(number, Ordering::SeqCst);
            })
            .unwrap()
        }

        for n in [1, 2, 2, 3, 3, 3] {
            add(n);
        }
        assert_eq!(COUNTER.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_recursive_call_recomputes_before_completion() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        fn add() {
            inline_memoize_once(&add, || {
                let seen = COUNTER.fetch_add(1, Ordering::SeqCst) + 1;
                if seen == 1 {
                    add();
                }
            })
            .unwrap()
        }

        add();
        add();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_distinct_functions_have_distinct_tables() {
        fn first() -> &'static str {
            inline_memoize_once(&first, || "first").unwrap()
        }
        fn second() -> &'static str {
            inline_memoize_once(&second, || "second").unwrap()
        }

        assert_eq!(first(), "first");
        assert_eq!(second(), "second");
    }

    #[test]
    fn test_clear_inline() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        fn load() -> usize {
            inline_memoize_once(&load, || COUNTER.fetch_add(1, Ordering::SeqCst)).unwrap()
        }

        assert_eq!(load(), 0);
        assert_eq!(load(), 0);
        assert!(clear_inline(&load));
        assert_eq!(load(), 1);
        assert!(clear_inline(&load));
        assert!(!clear_inline(&load));
    }

    #[test]
    fn test_unserializable_arguments() {
        fn sum(map: &HashMap<Vec<u8>, u8>) -> Result<u8, MemoizeError> {
            inline_memoize(&sum, &(map,), || map.values().sum())
        }

        let mut map = HashMap::new();
        map.insert(vec![0], 1);
        assert!(matches!(sum(&map), Err(MemoizeError::Serialization(_))));
    }
}

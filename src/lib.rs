//! # Memorito
//!
//! An in-process memoization library for Rust: wrap a function and repeated
//! calls with equivalent arguments return the stored result instead of
//! recomputing it.
//!
//! ## Features
//!
//! - **Easy to use**: add `#[memoized]` to a free function, or wrap a closure with [`memoize`]
//! - **Serde keys**: arguments are keyed by their JSON form; wrap shared objects in
//!   [`ByIdentity`] to key them by identity instead
//! - **Per-instance caches**: `this_namespace` partitions the cache by calling
//!   context without keeping the context alive
//! - **TTL**: entries expire after a configurable `Duration`
//! - **Reset and global clear**: `reset()` one function, [`clear_all`] every function
//! - **Result-aware**: `Err` values are never cached
//! - **Inline and weak-scoped memoization**: [`inline_memoize`], [`weak_memoize`]
//!
//! Async memoization lives in the `memorito-async` crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use memorito::memoized;
//!
//! #[memoized]
//! fn fibonacci(n: u64) -> u64 {
//!     if n < 2 {
//!         return n;
//!     }
//!     fibonacci(n - 1) + fibonacci(n - 2)
//! }
//!
//! assert_eq!(fibonacci(90), 2_880_067_194_370_816_120);
//! ```
//!
//! ## Wrapping closures
//!
//! ```rust
//! use memorito::{memoize_with, MemoizeOptions};
//! use std::time::Duration;
//!
//! let price = memoize_with(
//!     |(sku, qty): (String, u32)| qty * sku.len() as u32,
//!     MemoizeOptions::new().name("price").time(Duration::from_secs(60)),
//! );
//!
//! assert_eq!(price.call(("ABC".to_string(), 2)).unwrap(), 6);
//! assert_eq!(price.display_name(), "price::memoized");
//! ```
//!
//! ## Per-instance caching
//!
//! ```rust
//! use memorito::{memoize_method, MemoizeOptions};
//! use std::sync::Arc;
//!
//! struct Cart {
//!     items: Vec<u32>,
//! }
//!
//! let total = memoize_method(
//!     |cart: &Arc<Cart>, (): ()| cart.items.iter().sum::<u32>(),
//!     MemoizeOptions::new().this_namespace(true),
//! );
//!
//! let a = Arc::new(Cart { items: vec![1, 2] });
//! let b = Arc::new(Cart { items: vec![10] });
//! assert_eq!(total.call_on(&a, ()).unwrap(), 3);
//! assert_eq!(total.call_on(&b, ()).unwrap(), 10);
//! ```
//!
//! ## Statistics
//!
//! With the default `stats` feature every named function publishes hit and
//! miss counters in [`stats_registry`]:
//!
//! ```rust
//! use memorito::memoized;
//!
//! #[memoized(name = "stats_demo")]
//! fn square(x: u64) -> u64 {
//!     x * x
//! }
//!
//! square(3);
//! square(3);
//!
//! let stats = memorito::stats_registry::get("stats_demo").unwrap();
//! assert_eq!(stats.hits(), 1);
//! assert_eq!(stats.misses(), 1);
//! ```

pub use memorito_core::*;
pub use memorito_macros::memoized;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::memoized;
    pub use crate::{clear_all, memoize, memoize_method, memoize_with, try_memoize};
    pub use crate::{ByIdentity, MemoizeError, MemoizeOptions, Memoized};
}

//! # Memorito Core
//!
//! Core building blocks for the Memorito memoization library.
//!
//! ## Features
//!
//! - **Key Derivation**: arguments become cache keys through `serde_json`
//! - **Object Identity**: stable identity tokens for shared objects, held weakly
//! - **Generation Counter**: invalidate every memoized function at once without a registry
//! - **Per-Instance Caches**: buckets keyed weakly by the calling context
//! - **TTL Support**: time-to-live expiry checked on lookup
//! - **Inline and Weak-Scoped Memoization**: side tables keyed by function or argument identity
//!
//! ## Module Organization
//!
//! - [`cache_entry`] - Entry wrapper with timestamp tracking for TTL support
//! - [`keys`] - Cache key derivation
//! - [`identity`] - Object identity registry
//! - [`generation`] - Global invalidation through generation indexes
//! - [`weak_map`] - Map keyed weakly by `Arc` allocations
//! - [`memoize`] - The memoize engine
//! - [`inline`] - Self-memoizing functions
//! - [`weak_memoize`] - Caches scoped to the lifetime of their argument
mod cache_entry;
mod depth_limit;
mod error;
mod generation;
mod keys;
mod memoize;
mod weak_map;

pub mod identity;
pub mod inline;
pub mod weak_memoize;

#[cfg(feature = "stats")]
mod stats;

#[cfg(feature = "stats")]
pub mod stats_registry;

pub use cache_entry::CacheEntry;
pub use error::MemoizeError;
pub use generation::GenerationCounter;
pub use identity::{id_of, IdentityRegistry};
pub use inline::{clear_inline, inline_memoize, inline_memoize_once};
pub use keys::{derive_key, ByIdentity};
pub use memoize::{
    clear_all, memoize, memoize_method, memoize_with, try_memoize, try_memoize_method,
    MemoizeOptions, Memoized,
};
pub use weak_map::{ObjectRef, WeakHandle, WeakMap};
pub use weak_memoize::{weak_memoize, WeakMemoized};

#[cfg(feature = "stats")]
pub use stats::CacheStats;

/// Short type name of `F`, `"anonymous"` for closures. Used for diagnostic names.
#[doc(hidden)]
pub fn function_name_of<F: ?Sized>(_: &F) -> String {
    memoize::function_name::<F>()
}

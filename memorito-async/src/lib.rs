//! # Memorito Async
//!
//! Memoization for async functions that caches *pending* work, not results.
//!
//! Callers asking for the same arguments while a computation is in flight
//! share one [`Shared`](futures::future::Shared) future. As soon as that
//! computation settles, successfully or not, its entry is evicted: failures
//! are never cached and a later call starts a fresh computation.
//!
//! ## Features
//!
//! - **Shared in-flight futures**: concurrent callers trigger one invocation
//! - **Evict on settle**: success and failure both remove the entry
//! - **Weak scoping**: [`weak_memoize_async`] keys pending work by an argument object
//! - **Non-cancelling reset**: `reset()` forgets entries, started work keeps running
//! - **Attribute macro**: `#[memoized_async]` for free async functions
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! memorito-async = "0.4.0"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ## Examples
//!
//! ### Wrapping a function
//!
//! ```rust,ignore
//! use memorito_async::memoize_async;
//!
//! let fetch_user = memoize_async(|(id,): (u64,)| async move {
//!     database::fetch_user(id).await
//! });
//!
//! // Both callers await the same query
//! let (a, b) = tokio::join!(fetch_user.call((1,))?, fetch_user.call((1,))?);
//! ```
//!
//! ### Attribute macro
//!
//! ```rust,ignore
//! use memorito_async::memoized_async;
//!
//! #[memoized_async(name = "weather")]
//! async fn fetch_weather(city: String) -> Result<Weather, ApiError> {
//!     api::get_weather(&city).await
//! }
//! ```
//!
//! `ApiError` must implement `From<MemoizeError>` so argument serialization
//! failures can be reported through the function's own error type.
//!
//! ## Macro Parameters
//!
//! - `name`: Diagnostic name (default: function name)

mod memoize_async;
mod pending;
mod weak_memoize_async;

pub use memoize_async::{memoize_async, AsyncMemoized};
pub use pending::InFlight;
pub use weak_memoize_async::{weak_memoize_async, WeakMemoizedAsync};

// Re-export the macro
pub use memorito_async_macros::memoized_async;

// Re-export what the macro expansion and callers need from memorito-core
pub use memorito_core::{derive_key, ByIdentity, MemoizeError, ObjectRef};

// Re-export common dependencies that users might need
pub use futures;
pub use once_cell;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::memoized_async;
    pub use crate::{memoize_async, weak_memoize_async, AsyncMemoized, InFlight};
    pub use crate::{MemoizeError, WeakMemoizedAsync};
}

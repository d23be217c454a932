//! Name → statistics lookup for memoized functions.
//!
//! Wrappers created with an explicit `name` register their counters here.
//! Only weak references are kept: once a wrapper is dropped its name stops
//! resolving.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::CacheStats;

/// Global registry for cache statistics.
///
/// # Examples
///
/// ```
/// use memorito_core::stats_registry;
///
/// if let Some(stats) = stats_registry::get("user_profile") {
///     println!("Hits: {}", stats.hits());
/// }
///
/// for name in stats_registry::list() {
///     println!("Function: {}", name);
/// }
/// ```
static STATS_REGISTRY: Lazy<RwLock<HashMap<String, Weak<CacheStats>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `stats` under `name`, replacing any previous registration.
pub fn register(name: &str, stats: &Arc<CacheStats>) {
    let mut registry = STATS_REGISTRY.write();
    registry.retain(|_, stats| stats.strong_count() > 0);
    registry.insert(name.to_string(), Arc::downgrade(stats));
}

/// Returns a snapshot of the statistics registered under `name`.
pub fn get(name: &str) -> Option<CacheStats> {
    get_shared(name).map(|stats| (*stats).clone())
}

/// Returns the live statistics registered under `name`.
pub fn get_shared(name: &str) -> Option<Arc<CacheStats>> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).and_then(Weak::upgrade)
}

/// Names of every registered function that is still alive.
pub fn list() -> Vec<String> {
    let registry = STATS_REGISTRY.read();
    registry
        .iter()
        .filter(|(_, stats)| stats.strong_count() > 0)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Removes every registration without touching the counters themselves.
pub fn clear() {
    STATS_REGISTRY.write().clear();
}

/// Resets the counters registered under `name`. Returns `false` if there are none.
pub fn reset(name: &str) -> bool {
    match get_shared(name) {
        Some(stats) => {
            stats.reset();
            true
        }
        None => false,
    }
}

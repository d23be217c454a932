//! # Generation Counter
//!
//! Bulk invalidation without a registry of caches. Every memoized wrapper is
//! stamped with a generation index when created; [`GenerationCounter::invalidate_all`]
//! moves the `valid_from` watermark up to the next index to be handed out, and
//! each wrapper compares its own stamp against the watermark the next time it
//! is called. The counter never references the wrappers, so they are free to
//! be dropped.

use std::sync::atomic::{AtomicU64, Ordering};

static GLOBAL_GENERATIONS: GenerationCounter = GenerationCounter::new();

/// Process-wide generation state.
///
/// Invariant: `valid_from() <= current()`.
///
/// # Examples
///
/// ```
/// use memorito_core::GenerationCounter;
///
/// let counter = GenerationCounter::new();
/// let before = counter.allocate();
///
/// counter.invalidate_all();
/// let after = counter.allocate();
///
/// assert!(counter.is_stale(before));
/// assert!(!counter.is_stale(after));
/// ```
#[derive(Debug)]
pub struct GenerationCounter {
    current: AtomicU64,
    valid_from: AtomicU64,
}

impl GenerationCounter {
    pub const fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
            valid_from: AtomicU64::new(0),
        }
    }

    /// The counter shared by every wrapper that was not given its own.
    pub fn global() -> &'static GenerationCounter {
        &GLOBAL_GENERATIONS
    }

    /// Returns the next generation index and advances the counter.
    pub fn allocate(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel)
    }

    /// Marks every index allocated so far as stale.
    pub fn invalidate_all(&self) {
        let current = self.current.load(Ordering::Acquire);
        self.valid_from.fetch_max(current, Ordering::AcqRel);
        tracing::debug!(valid_from = current, "invalidated all memoized functions");
    }

    /// Returns `true` if a wrapper stamped with `generation` must drop its caches.
    #[inline]
    pub fn is_stale(&self, generation: u64) -> bool {
        generation < self.valid_from.load(Ordering::Acquire)
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn valid_from(&self) -> u64 {
        self.valid_from.load(Ordering::Acquire)
    }
}

impl Default for GenerationCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_monotonic() {
        let counter = GenerationCounter::new();
        assert_eq!(counter.allocate(), 0);
        assert_eq!(counter.allocate(), 1);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_invalidate_only_affects_earlier_indexes() {
        let counter = GenerationCounter::new();
        let a = counter.allocate();
        let b = counter.allocate();

        counter.invalidate_all();
        let c = counter.allocate();

        assert!(counter.is_stale(a));
        assert!(counter.is_stale(b));
        assert!(!counter.is_stale(c));
        assert!(counter.valid_from() <= counter.current());
    }

    #[test]
    fn test_invalidate_twice_without_allocation() {
        let counter = GenerationCounter::new();
        let a = counter.allocate();
        counter.invalidate_all();
        counter.invalidate_all();

        assert!(counter.is_stale(a));
        assert_eq!(counter.valid_from(), 1);
        assert_eq!(counter.current(), 1);
    }
}

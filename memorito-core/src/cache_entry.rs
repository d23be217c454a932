use std::time::{Duration, Instant};

/// A stored result and the moment it was stored.
///
/// # Type Parameters
///
/// * `T` - The type of the cached value
///
/// # Examples
///
/// ```
/// use memorito_core::CacheEntry;
/// use std::time::Duration;
///
/// let entry = CacheEntry::new(42);
/// assert_eq!(entry.value, 42);
///
/// assert!(!entry.is_expired(Some(Duration::from_secs(60))));
/// assert!(!entry.is_expired(None));
/// ```
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub inserted_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Creates a new cache entry stamped with `Instant::now()`.
    pub fn new(value: T) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    /// Age of the entry.
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    /// Returns true if the entry has outlived the provided TTL.
    ///
    /// An entry is valid while `age < ttl`; `None` means it never expires.
    ///
    /// # Examples
    ///
    /// ```
    /// use memorito_core::CacheEntry;
    /// use std::thread;
    /// use std::time::Duration;
    ///
    /// let entry = CacheEntry::new("data");
    /// thread::sleep(Duration::from_millis(20));
    ///
    /// assert!(entry.is_expired(Some(Duration::from_millis(10))));
    /// assert!(!entry.is_expired(Some(Duration::from_secs(10))));
    /// assert!(!entry.is_expired(None));
    /// ```
    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.age() >= ttl,
            None => false,
        }
    }
}

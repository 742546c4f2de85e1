//! Time-bounded memoization of the loaded dataset
//!
//! Every control change re-runs the pipeline; the source file is read at most
//! once per time-to-live window and the result is shared read-only.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live: one hour
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct Entry<T> {
    value: Arc<T>,
    loaded_at: Instant,
}

/// Single-entry cache owning `(value, loaded_at, ttl)`.
///
/// Constructed once per process and torn down with it. A value younger than
/// the TTL is handed out without calling the loader; an expired (or absent)
/// value is replaced by a fresh load. A failed load leaves the cache empty.
pub struct DatasetCache<T> {
    ttl: Duration,
    entry: Option<Entry<T>>,
    loads: usize,
}

impl<T> DatasetCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: None,
            loads: 0,
        }
    }

    /// Number of times the loader has actually run
    pub fn loads(&self) -> usize {
        self.loads
    }

    /// Return the cached value, loading it first if absent or expired
    pub fn get_or_load<E, F>(&mut self, loader: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.get_or_load_at(Instant::now(), loader)
    }

    /// Same as [`get_or_load`](Self::get_or_load) with an explicit clock reading
    pub fn get_or_load_at<E, F>(&mut self, now: Instant, loader: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(entry) = &self.entry {
            let age = now.saturating_duration_since(entry.loaded_at);
            if age < self.ttl {
                debug!(age_secs = age.as_secs(), "dataset cache hit");
                return Ok(Arc::clone(&entry.value));
            }
            debug!(age_secs = age.as_secs(), "dataset cache entry expired");
        }

        self.entry = None;
        let value = Arc::new(loader()?);
        self.loads += 1;
        self.entry = Some(Entry {
            value: Arc::clone(&value),
            loaded_at: now,
        });
        Ok(value)
    }

    /// Drop the cached value so the next request reloads
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.entry.is_some()
    }
}

impl<T> Default for DatasetCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(value: u32) -> impl FnOnce() -> Result<u32, String> {
        move || Ok(value)
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = DatasetCache::new(Duration::from_secs(60));
        let start = Instant::now();

        let first = cache.get_or_load_at(start, ok(1)).unwrap();
        let second = cache
            .get_or_load_at(start + Duration::from_secs(59), ok(2))
            .unwrap();

        assert_eq!(*first, 1);
        assert_eq!(*second, 1);
        assert_eq!(cache.loads(), 1);
    }

    #[test]
    fn test_reload_after_expiry() {
        let mut cache = DatasetCache::new(Duration::from_secs(60));
        let start = Instant::now();

        cache.get_or_load_at(start, ok(1)).unwrap();
        let reloaded = cache
            .get_or_load_at(start + Duration::from_secs(60), ok(2))
            .unwrap();

        assert_eq!(*reloaded, 2);
        assert_eq!(cache.loads(), 2);
    }

    #[test]
    fn test_failed_load_leaves_no_entry() {
        let mut cache: DatasetCache<u32> = DatasetCache::default();
        let result = cache.get_or_load(|| Err("boom".to_string()));

        assert_eq!(result.unwrap_err(), "boom");
        assert!(!cache.is_loaded());
        assert_eq!(cache.loads(), 0);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let mut cache = DatasetCache::default();
        cache.get_or_load(ok(1)).unwrap();
        cache.invalidate();

        assert_eq!(*cache.get_or_load(ok(5)).unwrap(), 5);
        assert_eq!(cache.loads(), 2);
    }
}

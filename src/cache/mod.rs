//! Memoization cache for derived aggregate computations.
//!
//! Charts are views: the expensive part (statistics over potentially
//! hundreds of thousands of values) must happen at most once per distinct
//! (scenario, selection, operation, params) combination per TTL window,
//! decoupled from render frequency. `compute_or_get` is the only path by
//! which derived aggregates are produced for display; the statistical
//! formulas themselves are supplied by the caller.

pub mod fingerprint;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ComputationError, TerraError, TerraResult};

pub use fingerprint::SelectionFingerprint;

fn lock_err(context: &'static str) -> TerraError {
    TerraError::internal(format!("poisoned lock: {context}"))
}

/// Compute cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a cached value stays valid.
    pub ttl: StdDuration,
    /// Maximum entry count before oldest-first eviction.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: StdDuration::from_secs(30),
            capacity: 512,
        }
    }
}

/// Composite key for one memoized aggregate.
///
/// The `Display` form is the composite string
/// `scenario::fingerprint::operation::params`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Scenario the aggregate was computed in.
    pub scenario: String,
    /// Fingerprint of the entity selection that was aggregated.
    pub selection: SelectionFingerprint,
    /// Operation name (e.g. "histogram", "descriptive", "correlation").
    pub operation: String,
    /// Serialized operation parameters.
    pub params: String,
}

impl CacheKey {
    /// Creates a key from pre-serialized parameters.
    #[must_use]
    pub fn new(
        scenario: impl Into<String>,
        selection: SelectionFingerprint,
        operation: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            selection,
            operation: operation.into(),
            params: params.into(),
        }
    }

    /// Creates a key, serializing the parameters to their canonical JSON
    /// form (object keys sorted).
    ///
    /// # Errors
    ///
    /// Returns an internal error when the parameters fail to serialize.
    pub fn with_params<P: Serialize>(
        scenario: impl Into<String>,
        selection: SelectionFingerprint,
        operation: impl Into<String>,
        params: &P,
    ) -> TerraResult<Self> {
        let serialized = serde_json::to_string(params)
            .map_err(|e| TerraError::internal(format!("cache params serialization: {e}")))?;
        Ok(Self::new(scenario, selection, operation, serialized))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}::{}",
            self.scenario, self.selection, self.operation, self.params
        )
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    computed_at: DateTime<Utc>,
}

/// TTL- and capacity-bounded memoization cache.
///
/// Eviction runs on write, oldest `computed_at` first (key-order
/// tie-break), so behavior is deterministic and testable; there is no
/// background timer.
#[derive(Debug)]
pub struct ComputeCache<V> {
    state: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ComputeCache<V> {
    /// Creates a cache from configuration.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            ttl: Duration::from_std(config.ttl).unwrap_or(Duration::MAX),
            capacity: config.capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn is_valid(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.computed_at) < self.ttl
    }

    /// Returns the cached value for a key when present and within TTL.
    ///
    /// An expired entry is a miss; it is dropped on a later write, never
    /// served.
    pub fn get(&self, key: &CacheKey) -> TerraResult<Option<V>> {
        let state = self.state.read().map_err(|_| lock_err("cache.get"))?;
        let now = Utc::now();
        match state.get(key) {
            Some(entry) if self.is_valid(entry, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Stores a value, stamping the computation time and enforcing
    /// capacity.
    pub fn put(&self, key: CacheKey, value: V) -> TerraResult<()> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.put"))?;
        state.insert(
            key,
            CacheEntry {
                value,
                computed_at: Utc::now(),
            },
        );
        self.evict_over_capacity(&mut state);
        Ok(())
    }

    fn evict_over_capacity(&self, state: &mut HashMap<CacheKey, CacheEntry<V>>) {
        while state.len() > self.capacity {
            let Some(oldest) = state
                .iter()
                .min_by(|(ka, ea), (kb, eb)| {
                    ea.computed_at
                        .cmp(&eb.computed_at)
                        .then_with(|| ka.to_string().cmp(&kb.to_string()))
                })
                .map(|(k, _)| k.clone())
            else {
                return;
            };
            tracing::debug!(key = %oldest, "evicting oldest cache entry over capacity");
            state.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the cached value or computes, stores, and returns it.
    ///
    /// This is the primary entry point and the only path that produces
    /// derived aggregates for display. The compute function runs without
    /// the cache lock held (it is a suspension point); a failing compute
    /// stores nothing.
    pub fn compute_or_get<F>(&self, key: &CacheKey, compute: F) -> TerraResult<V>
    where
        F: FnOnce() -> Result<V, ComputationError>,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }
        let value = compute()?;
        self.put(key.clone(), value.clone())?;
        Ok(value)
    }

    /// Removes every entry whose selection fingerprint matches.
    ///
    /// Triggered when the underlying selection set changes: a stats result
    /// implicitly depends on exactly which entities were aggregated.
    /// Returns the number of entries removed.
    pub fn invalidate_selection(
        &self,
        fingerprint: &SelectionFingerprint,
    ) -> TerraResult<usize> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("cache.invalidate_selection"))?;
        let before = state.len();
        state.retain(|key, _| key.selection != *fingerprint);
        Ok(before - state.len())
    }

    /// Drops every entry. Used on scenario switch or data reload.
    pub fn clear_all(&self) -> TerraResult<()> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.clear_all"))?;
        state.clear();
        Ok(())
    }

    /// Number of stored entries (valid or expired-but-unevicted).
    pub fn len(&self) -> TerraResult<usize> {
        let state = self.state.read().map_err(|_| lock_err("cache.len"))?;
        Ok(state.len())
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> TerraResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Served-from-cache count.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Absent-or-expired lookup count.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Capacity-eviction count.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn cache(ttl: StdDuration, capacity: usize) -> ComputeCache<f64> {
        ComputeCache::new(&CacheConfig { ttl, capacity })
    }

    fn key(scenario: &str, ids: &[&str], operation: &str) -> CacheKey {
        CacheKey::new(
            scenario,
            SelectionFingerprint::of(ids.iter().copied()),
            operation,
            "{}",
        )
    }

    #[test]
    fn compute_or_get_invokes_compute_exactly_once_within_ttl() {
        let cache = cache(StdDuration::from_secs(3600), 16);
        let k = key("base", &["a", "b"], "descriptive");
        let calls = Cell::new(0u32);

        let compute = || {
            calls.set(calls.get() + 1);
            Ok(42.0)
        };

        assert_eq!(cache.compute_or_get(&k, compute).unwrap(), 42.0);
        assert_eq!(
            cache
                .compute_or_get(&k, || {
                    calls.set(calls.get() + 1);
                    Ok(0.0)
                })
                .unwrap(),
            42.0
        );
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn expired_entries_are_never_served() {
        let cache = cache(StdDuration::ZERO, 16);
        let k = key("base", &["a"], "descriptive");

        cache.put(k.clone(), 1.0).unwrap();
        // TTL of zero expires immediately: a miss triggers fresh
        // computation before return.
        assert!(cache.get(&k).unwrap().is_none());
        assert_eq!(cache.compute_or_get(&k, || Ok(2.0)).unwrap(), 2.0);
    }

    #[test]
    fn failing_compute_stores_nothing() {
        let cache = cache(StdDuration::from_secs(3600), 16);
        let k = key("base", &["a"], "histogram");

        let err = cache
            .compute_or_get(&k, || {
                Err(ComputationError::recoverable("numerics", "histogram", "bad bins"))
            })
            .unwrap_err();
        assert!(matches!(err, TerraError::Computation(_)));
        assert_eq!(cache.len().unwrap(), 0);

        // A later successful compute fills the entry.
        assert_eq!(cache.compute_or_get(&k, || Ok(7.0)).unwrap(), 7.0);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn invalidate_selection_removes_only_matching_entries() {
        let cache = cache(StdDuration::from_secs(3600), 16);
        let selected = SelectionFingerprint::of(["a", "b"]);
        let other = SelectionFingerprint::of(["c"]);

        cache
            .put(CacheKey::new("base", selected.clone(), "descriptive", "{}"), 1.0)
            .unwrap();
        cache
            .put(CacheKey::new("variant", selected.clone(), "histogram", "{}"), 2.0)
            .unwrap();
        cache
            .put(CacheKey::new("base", other.clone(), "descriptive", "{}"), 3.0)
            .unwrap();

        let removed = cache.invalidate_selection(&selected).unwrap();
        assert_eq!(removed, 2);
        assert!(cache
            .get(&CacheKey::new("base", selected.clone(), "descriptive", "{}"))
            .unwrap()
            .is_none());
        assert!(cache
            .get(&CacheKey::new("base", other, "descriptive", "{}"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn capacity_eviction_drops_oldest_first() {
        let cache = cache(StdDuration::from_secs(3600), 2);

        let k1 = key("base", &["a"], "op1");
        let k2 = key("base", &["a"], "op2");
        let k3 = key("base", &["a"], "op3");

        cache.put(k1.clone(), 1.0).unwrap();
        cache.put(k2.clone(), 2.0).unwrap();
        cache.put(k3.clone(), 3.0).unwrap();

        assert_eq!(cache.len().unwrap(), 2);
        assert_eq!(cache.evictions(), 1);
        // k1 was written first, so it went first.
        assert!(cache.get(&k1).unwrap().is_none());
        assert!(cache.get(&k2).unwrap().is_some());
        assert!(cache.get(&k3).unwrap().is_some());
    }

    #[test]
    fn clear_all_resets_the_cache() {
        let cache = cache(StdDuration::from_secs(3600), 16);
        cache.put(key("base", &["a"], "op"), 1.0).unwrap();
        cache.clear_all().unwrap();
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn display_form_is_the_composite_string() {
        let fp = SelectionFingerprint::of(["a"]);
        let k = CacheKey::new("base", fp.clone(), "histogram", "{\"bins\":10}");
        assert_eq!(format!("{k}"), format!("base::{fp}::histogram::{{\"bins\":10}}"));
    }
}

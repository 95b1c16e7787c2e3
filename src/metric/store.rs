//! Composite-key metric store with derived secondary indices.
//!
//! The store maps `MetricKey -> MetricResult` and maintains four index sets
//! (by analysis, metric, scenario, filter) that are always consistent with
//! the primary map: every stored key appears in exactly the buckets matching
//! its components, and no bucket references an absent key. `set_result`,
//! `set_results_batch`, `remove_result`, and `clear` are the only mutation
//! paths.
//!
//! Statistics recomputation is deferred: writes invalidate the memoized
//! statistics for the touched (analysis, metric) pair, and reads recompute
//! lazily, so a burst of writes never triggers a synchronous recomputation
//! storm.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::error::{ConfigurationError, TerraError, TerraResult};
use crate::metric::key::{MetricKey, ALL};
use crate::metric::result::MetricResult;
use crate::metric::stats::{self, Direction, MetricStatistics};

fn lock_err(context: &'static str) -> TerraError {
    TerraError::internal(format!("poisoned lock: {context}"))
}

#[derive(Debug, Clone, Copy)]
enum Dimension {
    Analysis,
    Metric,
    Scenario,
    Filter,
}

#[derive(Debug, Default)]
struct StoreState {
    results: HashMap<MetricKey, MetricResult>,
    by_analysis: HashMap<String, HashSet<MetricKey>>,
    by_metric: HashMap<String, HashSet<MetricKey>>,
    by_scenario: HashMap<String, HashSet<MetricKey>>,
    by_filter: HashMap<String, HashSet<MetricKey>>,
    // Memoized statistics keyed by (analysis, metric, filter); absence
    // means dirty.
    stats_cache: HashMap<(String, String, String), MetricStatistics>,
}

/// Thread-safe in-memory metric store.
#[derive(Debug)]
pub struct MetricStore {
    state: RwLock<StoreState>,
    directions: HashMap<String, Direction>,
}

impl MetricStore {
    /// Creates a store with the configured per-metric good directions.
    ///
    /// Directions are configuration, not data: metrics missing from the map
    /// fail with `ConfigurationError::MissingDirection` when direction-
    /// sensitive statistics are requested.
    #[must_use]
    pub fn new(directions: HashMap<String, Direction>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            directions,
        }
    }

    /// The configured direction for a metric, if any.
    #[must_use]
    pub fn direction_for(&self, metric: &str) -> Option<Direction> {
        self.directions.get(metric).copied()
    }

    fn index_insert(state: &mut StoreState, key: &MetricKey) {
        state
            .by_analysis
            .entry(key.analysis().to_string())
            .or_default()
            .insert(key.clone());
        state
            .by_metric
            .entry(key.metric().to_string())
            .or_default()
            .insert(key.clone());
        state
            .by_scenario
            .entry(key.scenario().to_string())
            .or_default()
            .insert(key.clone());
        state
            .by_filter
            .entry(key.filter().to_string())
            .or_default()
            .insert(key.clone());
    }

    fn index_remove(state: &mut StoreState, key: &MetricKey) {
        let buckets: [(&mut HashMap<String, HashSet<MetricKey>>, &str); 4] = [
            (&mut state.by_analysis, key.analysis()),
            (&mut state.by_metric, key.metric()),
            (&mut state.by_scenario, key.scenario()),
            (&mut state.by_filter, key.filter()),
        ];
        for (index, component) in buckets {
            if let Some(set) = index.get_mut(component) {
                set.remove(key);
                if set.is_empty() {
                    index.remove(component);
                }
            }
        }
    }

    fn invalidate_stats(state: &mut StoreState, key: &MetricKey) {
        state
            .stats_cache
            .retain(|(a, m, _), _| a != key.analysis() || m != key.metric());
    }

    /// Inserts or replaces the result for a key.
    ///
    /// This is the single-entry mutation path: all index updates and
    /// statistics invalidation happen here.
    pub fn set_result(&self, key: MetricKey, result: MetricResult) -> TerraResult<()> {
        let mut state = self.state.write().map_err(|_| lock_err("store.set_result"))?;
        Self::apply(&mut state, key, result);
        Ok(())
    }

    /// Applies a batch of results under a single lock.
    ///
    /// Semantically identical to repeated `set_result`; statistics
    /// invalidation still happens per touched pair, but no reader can
    /// observe a partially applied batch. Returns the number of entries
    /// applied.
    pub fn set_results_batch(
        &self,
        entries: impl IntoIterator<Item = (MetricKey, MetricResult)>,
    ) -> TerraResult<usize> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("store.set_results_batch"))?;
        let mut applied = 0;
        for (key, result) in entries {
            Self::apply(&mut state, key, result);
            applied += 1;
        }
        Ok(applied)
    }

    fn apply(state: &mut StoreState, key: MetricKey, result: MetricResult) {
        Self::invalidate_stats(state, &key);
        if state.results.insert(key.clone(), result).is_none() {
            Self::index_insert(state, &key);
        }
        // On replacement the key's buckets are unchanged: the tuple
        // components are the identity of the entry.
    }

    /// Looks up the result for a key.
    ///
    /// `Ok(None)` means "no data yet" and is distinct from a stored zero.
    pub fn get_result(&self, key: &MetricKey) -> TerraResult<Option<MetricResult>> {
        let state = self.state.read().map_err(|_| lock_err("store.get_result"))?;
        Ok(state.results.get(key).cloned())
    }

    /// Removes the result for a key, pruning all index buckets.
    ///
    /// Returns the removed result; `Ok(None)` for an unknown key.
    pub fn remove_result(&self, key: &MetricKey) -> TerraResult<Option<MetricResult>> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("store.remove_result"))?;
        let Some(removed) = state.results.remove(key) else {
            return Ok(None);
        };
        Self::index_remove(&mut state, key);
        Self::invalidate_stats(&mut state, key);
        Ok(Some(removed))
    }

    /// Drops all results, indices, and memoized statistics.
    pub fn clear(&self) -> TerraResult<()> {
        let mut state = self.state.write().map_err(|_| lock_err("store.clear"))?;
        *state = StoreState::default();
        Ok(())
    }

    /// Number of stored results.
    pub fn len(&self) -> TerraResult<usize> {
        let state = self.state.read().map_err(|_| lock_err("store.len"))?;
        Ok(state.results.len())
    }

    /// Whether the store holds no results.
    pub fn is_empty(&self) -> TerraResult<bool> {
        Ok(self.len()? == 0)
    }

    fn query_bucket(
        &self,
        dimension: Dimension,
        component: &str,
        context: &'static str,
    ) -> TerraResult<Vec<(MetricKey, MetricResult)>> {
        let state = self.state.read().map_err(|_| lock_err(context))?;
        let index = match dimension {
            Dimension::Analysis => &state.by_analysis,
            Dimension::Metric => &state.by_metric,
            Dimension::Scenario => &state.by_scenario,
            Dimension::Filter => &state.by_filter,
        };
        let Some(keys) = index.get(component) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<(MetricKey, MetricResult)> = keys
            .iter()
            .filter_map(|k| state.results.get(k).map(|r| (k.clone(), r.clone())))
            .collect();
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(out)
    }

    /// All results for an analysis, in canonical key order. O(bucket size).
    pub fn query_by_analysis(
        &self,
        analysis: &str,
    ) -> TerraResult<Vec<(MetricKey, MetricResult)>> {
        self.query_bucket(Dimension::Analysis, analysis, "store.query_by_analysis")
    }

    /// All results for a metric, in canonical key order. O(bucket size).
    pub fn query_by_metric(&self, metric: &str) -> TerraResult<Vec<(MetricKey, MetricResult)>> {
        self.query_bucket(Dimension::Metric, metric, "store.query_by_metric")
    }

    /// All results for a scenario, in canonical key order. O(bucket size).
    pub fn query_by_scenario(
        &self,
        scenario: &str,
    ) -> TerraResult<Vec<(MetricKey, MetricResult)>> {
        self.query_bucket(Dimension::Scenario, scenario, "store.query_by_scenario")
    }

    /// All results for a filter, in canonical key order. O(bucket size).
    pub fn query_by_filter(&self, filter: &str) -> TerraResult<Vec<(MetricKey, MetricResult)>> {
        self.query_bucket(Dimension::Filter, filter, "store.query_by_filter")
    }

    /// Cross-scenario statistics for an (analysis, metric) pair, over the
    /// unfiltered (`"all"`) results.
    ///
    /// `Ok(None)` when the pair has no results; an unknown pair is not an
    /// error.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::MissingDirection` when results exist but the
    /// metric has no configured good direction: guessing would silently
    /// invert rankings.
    pub fn statistics(
        &self,
        analysis: &str,
        metric: &str,
    ) -> TerraResult<Option<MetricStatistics>> {
        self.statistics_filtered(analysis, metric, ALL)
    }

    /// Cross-scenario statistics restricted to one filter slice.
    pub fn statistics_filtered(
        &self,
        analysis: &str,
        metric: &str,
        filter: &str,
    ) -> TerraResult<Option<MetricStatistics>> {
        let cache_key = (
            analysis.to_string(),
            metric.to_string(),
            filter.to_string(),
        );

        {
            let state = self.state.read().map_err(|_| lock_err("store.statistics"))?;
            if let Some(memo) = state.stats_cache.get(&cache_key) {
                return Ok(Some(memo.clone()));
            }
        }

        let mut state = self.state.write().map_err(|_| lock_err("store.statistics"))?;
        // Another reader may have filled the memo between the locks.
        if let Some(memo) = state.stats_cache.get(&cache_key) {
            return Ok(Some(memo.clone()));
        }

        let samples = Self::gather(&state, analysis, metric, filter);
        if samples.is_empty() {
            return Ok(None);
        }

        let direction = self.directions.get(metric).copied().ok_or_else(|| {
            TerraError::Configuration(ConfigurationError::MissingDirection {
                metric: metric.to_string(),
            })
        })?;

        let Some(computed) = stats::compute(samples, direction) else {
            return Ok(None);
        };
        state.stats_cache.insert(cache_key, computed.clone());
        Ok(Some(computed))
    }

    fn gather(
        state: &StoreState,
        analysis: &str,
        metric: &str,
        filter: &str,
    ) -> Vec<(String, f64)> {
        let (Some(by_analysis), Some(by_metric)) = (
            state.by_analysis.get(analysis),
            state.by_metric.get(metric),
        ) else {
            return Vec::new();
        };

        // Intersect through the smaller bucket.
        let (small, large) = if by_analysis.len() <= by_metric.len() {
            (by_analysis, by_metric)
        } else {
            (by_metric, by_analysis)
        };

        small
            .iter()
            .filter(|k| large.contains(*k) && k.filter() == filter)
            .filter_map(|k| {
                state
                    .results
                    .get(k)
                    .map(|r| (k.scenario().to_string(), r.value))
            })
            .collect()
    }

    /// Verifies the index/store consistency invariant. Test support.
    #[cfg(test)]
    pub(crate) fn assert_index_consistent(&self) {
        let state = self.state.read().unwrap();

        for key in state.results.keys() {
            assert!(state.by_analysis[key.analysis()].contains(key));
            assert!(state.by_metric[key.metric()].contains(key));
            assert!(state.by_scenario[key.scenario()].contains(key));
            assert!(state.by_filter[key.filter()].contains(key));
        }

        let indexed = [
            &state.by_analysis,
            &state.by_metric,
            &state.by_scenario,
            &state.by_filter,
        ];
        for index in indexed {
            for (component, keys) in index {
                assert!(!keys.is_empty(), "empty bucket left for '{component}'");
                for key in keys {
                    assert!(
                        state.results.contains_key(key),
                        "index references absent key {key}"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directions() -> HashMap<String, Direction> {
        let mut map = HashMap::new();
        map.insert("avg_utci".to_string(), Direction::LowerIsBetter);
        map.insert("green_ratio".to_string(), Direction::HigherIsBetter);
        map
    }

    fn key(analysis: &str, metric: &str, scenario: &str) -> MetricKey {
        MetricKey::unfiltered(analysis, metric, scenario).unwrap()
    }

    fn result(value: f64) -> MetricResult {
        MetricResult::new(value).unwrap()
    }

    #[test]
    fn set_get_and_replace() {
        let store = MetricStore::new(directions());
        let k = key("thermal", "avg_utci", "base");

        assert!(store.get_result(&k).unwrap().is_none());

        store.set_result(k.clone(), result(23.5)).unwrap();
        assert_eq!(store.get_result(&k).unwrap().unwrap().value, 23.5);

        // Replacement swaps the record, never mutates in place.
        store.set_result(k.clone(), result(24.0)).unwrap();
        assert_eq!(store.get_result(&k).unwrap().unwrap().value, 24.0);
        assert_eq!(store.len().unwrap(), 1);
        store.assert_index_consistent();
    }

    #[test]
    fn indices_track_every_mutation() {
        let store = MetricStore::new(directions());
        let k1 = key("thermal", "avg_utci", "base");
        let k2 = key("thermal", "avg_utci", "variant");
        let k3 = key("vegetation", "green_ratio", "base");

        for (k, v) in [(&k1, 23.5), (&k2, 25.0), (&k3, 0.3)] {
            store.set_result(k.clone(), result(v)).unwrap();
            store.assert_index_consistent();
        }

        let thermal = store.query_by_analysis("thermal").unwrap();
        assert_eq!(thermal.len(), 2);
        // Canonical key order is deterministic.
        assert_eq!(thermal[0].0, k1);
        assert_eq!(thermal[1].0, k2);

        let base = store.query_by_scenario("base").unwrap();
        assert_eq!(base.len(), 2);

        assert_eq!(store.query_by_metric("green_ratio").unwrap().len(), 1);
        assert_eq!(store.query_by_filter(ALL).unwrap().len(), 3);
        assert!(store.query_by_analysis("noise").unwrap().is_empty());
    }

    #[test]
    fn remove_prunes_buckets() {
        let store = MetricStore::new(directions());
        let k1 = key("thermal", "avg_utci", "base");
        let k2 = key("thermal", "avg_utci", "variant");

        store.set_result(k1.clone(), result(23.5)).unwrap();
        store.set_result(k2.clone(), result(25.0)).unwrap();

        let removed = store.remove_result(&k1).unwrap().unwrap();
        assert_eq!(removed.value, 23.5);
        store.assert_index_consistent();
        assert!(store.query_by_scenario("base").unwrap().is_empty());

        // Removing again is not an error.
        assert!(store.remove_result(&k1).unwrap().is_none());

        store.remove_result(&k2).unwrap();
        assert!(store.is_empty().unwrap());
        store.assert_index_consistent();
    }

    #[test]
    fn batch_applies_all_entries() {
        let store = MetricStore::new(directions());
        let applied = store
            .set_results_batch(vec![
                (key("thermal", "avg_utci", "base"), result(23.5)),
                (key("thermal", "avg_utci", "variant"), result(25.0)),
                (key("thermal", "avg_utci", "greened"), result(21.0)),
            ])
            .unwrap();
        assert_eq!(applied, 3);
        assert_eq!(store.len().unwrap(), 3);
        store.assert_index_consistent();

        let stats = store.statistics("thermal", "avg_utci").unwrap().unwrap();
        assert_eq!(stats.rankings.len(), 3);
    }

    #[test]
    fn statistics_match_the_configured_direction() {
        let store = MetricStore::new(directions());
        store
            .set_result(key("thermal", "avg_utci", "base"), result(23.5))
            .unwrap();
        store
            .set_result(key("thermal", "avg_utci", "variant"), result(25.0))
            .unwrap();

        let stats = store.statistics("thermal", "avg_utci").unwrap().unwrap();
        assert_eq!(stats.best.scenario, "base");
        assert_eq!(stats.worst.scenario, "variant");
        assert!((stats.average - 24.25).abs() < 1e-12);
        assert_eq!(stats.rankings[0].rank, 1);
        assert_eq!(stats.rankings[0].scenario, "base");
    }

    #[test]
    fn statistics_for_unknown_pair_are_empty_not_an_error() {
        let store = MetricStore::new(directions());
        assert!(store.statistics("thermal", "avg_utci").unwrap().is_none());
    }

    #[test]
    fn statistics_without_direction_are_a_configuration_error() {
        let store = MetricStore::new(HashMap::new());
        store
            .set_result(key("thermal", "avg_utci", "base"), result(23.5))
            .unwrap();

        let err = store.statistics("thermal", "avg_utci").unwrap_err();
        assert!(matches!(
            err,
            TerraError::Configuration(ConfigurationError::MissingDirection { .. })
        ));
    }

    #[test]
    fn statistics_memo_is_invalidated_by_writes() {
        let store = MetricStore::new(directions());
        store
            .set_result(key("thermal", "avg_utci", "base"), result(23.5))
            .unwrap();

        let first = store.statistics("thermal", "avg_utci").unwrap().unwrap();
        assert_eq!(first.rankings.len(), 1);

        store
            .set_result(key("thermal", "avg_utci", "variant"), result(25.0))
            .unwrap();
        let second = store.statistics("thermal", "avg_utci").unwrap().unwrap();
        assert_eq!(second.rankings.len(), 2);

        store
            .remove_result(&key("thermal", "avg_utci", "variant"))
            .unwrap();
        let third = store.statistics("thermal", "avg_utci").unwrap().unwrap();
        assert_eq!(third.rankings.len(), 1);
    }

    #[test]
    fn statistics_ignore_other_filter_slices() {
        let store = MetricStore::new(directions());
        store
            .set_result(key("thermal", "avg_utci", "base"), result(23.5))
            .unwrap();
        store
            .set_result(
                MetricKey::new("thermal", "avg_utci", "base", "residential").unwrap(),
                result(99.0),
            )
            .unwrap();

        let stats = store.statistics("thermal", "avg_utci").unwrap().unwrap();
        assert_eq!(stats.rankings.len(), 1);
        assert_eq!(stats.best.value, 23.5);

        let sliced = store
            .statistics_filtered("thermal", "avg_utci", "residential")
            .unwrap()
            .unwrap();
        assert_eq!(sliced.best.value, 99.0);
    }

    #[test]
    fn clear_resets_everything() {
        let store = MetricStore::new(directions());
        store
            .set_result(key("thermal", "avg_utci", "base"), result(23.5))
            .unwrap();
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(store.statistics("thermal", "avg_utci").unwrap().is_none());
        store.assert_index_consistent();
    }
}

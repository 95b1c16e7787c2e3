//! Analytics engine facade.
//!
//! `AnalyticsCore` wires the metric store, spatial index, compute cache,
//! and orchestrator together from one configuration object, and offers the
//! token-to-lookup convenience reads the rendering layer uses.

use std::sync::{Arc, Mutex};

use crate::cache::{ComputeCache, SelectionFingerprint};
use crate::config::CoreConfig;
use crate::entity::{EntityId, Position};
use crate::error::{TerraError, TerraResult, ValidationError};
use crate::metric::{MetricKey, MetricResult, MetricStore};
use crate::orchestrator::Orchestrator;
use crate::spatial::{GridBounds, SpatialIndex};
use crate::token::{self, ResolutionContext, TokenValue};

/// Conventional state key for "the entity set changed" notifications.
pub const ENTITIES_STATE_KEY: &str = "entities";

fn lock_err(context: &'static str) -> TerraError {
    TerraError::internal(format!("poisoned lock: {context}"))
}

/// One assembled analytics core.
///
/// Constructing several independent cores is cheap and safe; nothing is
/// shared between instances.
#[derive(Debug)]
pub struct AnalyticsCore {
    metrics: Arc<MetricStore>,
    spatial: Mutex<SpatialIndex>,
    aggregates: ComputeCache<serde_json::Value>,
    orchestrator: Orchestrator,
}

impl AnalyticsCore {
    /// Builds all components from the configuration.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::InvalidCellSize` for a bad spatial cell size.
    pub fn new(config: &CoreConfig) -> TerraResult<Self> {
        let spatial = SpatialIndex::new(&config.spatial).map_err(TerraError::Configuration)?;
        Ok(Self {
            metrics: Arc::new(MetricStore::new(config.metric_directions.clone())),
            spatial: Mutex::new(spatial),
            aggregates: ComputeCache::new(&config.cache),
            orchestrator: Orchestrator::new(&config.scheduler),
        })
    }

    /// The metric store. Cloning the `Arc` lets pipeline steps write to it.
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricStore> {
        Arc::clone(&self.metrics)
    }

    /// The compute cache for derived aggregates.
    #[must_use]
    pub fn aggregates(&self) -> &ComputeCache<serde_json::Value> {
        &self.aggregates
    }

    /// The orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Indexes an entity position.
    pub fn insert_position(&self, id: EntityId, position: Position) -> TerraResult<()> {
        let mut spatial = self.spatial.lock().map_err(|_| lock_err("engine.insert_position"))?;
        spatial.insert(id, position).map_err(TerraError::Validation)
    }

    /// Removes an entity position (best-effort; see the spatial index).
    pub fn remove_position(&self, id: &EntityId, position: Position) -> TerraResult<bool> {
        let mut spatial = self.spatial.lock().map_err(|_| lock_err("engine.remove_position"))?;
        Ok(spatial.remove(id, position))
    }

    /// Proximity query; returns a superset (see the spatial index).
    pub fn query_radius(&self, center: Position, radius: f64) -> TerraResult<Vec<EntityId>> {
        let spatial = self.spatial.lock().map_err(|_| lock_err("engine.query_radius"))?;
        Ok(spatial.query(center, radius))
    }

    /// Rectangular region query; returns a superset.
    pub fn query_region(&self, bounds: &GridBounds) -> TerraResult<Vec<EntityId>> {
        let spatial = self.spatial.lock().map_err(|_| lock_err("engine.query_region"))?;
        Ok(spatial.query_bounds(bounds))
    }

    /// Resolves a token string for an (analysis, metric) pair.
    ///
    /// Statistics are fetched from the metric store when the pair has any;
    /// statistics-dependent tokens on an empty pair fail with a validation
    /// error rather than inventing data.
    pub fn resolve_token(
        &self,
        token: &str,
        analysis: &str,
        metric: &str,
        current_scenario: &str,
        active_scenario: &str,
    ) -> TerraResult<TokenValue> {
        let statistics = self.metrics.statistics(analysis, metric)?;
        let ctx = ResolutionContext {
            current_scenario,
            active_scenario,
            statistics: statistics.as_ref(),
        };
        token::resolve(token, &ctx).map_err(TerraError::Validation)
    }

    /// Resolves a token that must yield a scenario key.
    pub fn resolve_scenario_key(
        &self,
        token: &str,
        analysis: &str,
        metric: &str,
        current_scenario: &str,
        active_scenario: &str,
    ) -> TerraResult<String> {
        let value =
            self.resolve_token(token, analysis, metric, current_scenario, active_scenario)?;
        match value {
            TokenValue::ScenarioKey(scenario) => Ok(scenario),
            TokenValue::NumericValue(_) => Err(TerraError::Validation(
                ValidationError::TokenKindMismatch {
                    token: token.to_string(),
                    expected: "scenario-key",
                    found: "numeric-value",
                },
            )),
            TokenValue::FilterKey(_) => Err(TerraError::Validation(
                ValidationError::TokenKindMismatch {
                    token: token.to_string(),
                    expected: "scenario-key",
                    found: "filter-key",
                },
            )),
        }
    }

    /// Looks up a result after substituting a token-resolved scenario into
    /// the key.
    pub fn lookup_with_token(
        &self,
        key: &MetricKey,
        token: &str,
        current_scenario: &str,
        active_scenario: &str,
    ) -> TerraResult<Option<MetricResult>> {
        let scenario = self.resolve_scenario_key(
            token,
            key.analysis(),
            key.metric(),
            current_scenario,
            active_scenario,
        )?;
        let concrete = key.with_scenario(scenario).map_err(TerraError::Validation)?;
        self.metrics.get_result(&concrete)
    }

    /// Invalidates cached aggregates for a selection that changed.
    pub fn selection_changed(&self, fingerprint: &SelectionFingerprint) -> TerraResult<usize> {
        self.aggregates.invalidate_selection(fingerprint)
    }

    /// Forwards an "entities changed" signal to the reactive triggers.
    pub fn notify_entities_changed(&self) {
        self.orchestrator.notify_changed(ENTITIES_STATE_KEY);
    }

    /// Full reset on data reload: metric store, spatial index, and cache.
    ///
    /// The in-memory structures are rebuilt from authoritative external
    /// data afterwards.
    pub fn reload(&self) -> TerraResult<()> {
        self.metrics.clear()?;
        self.aggregates.clear_all()?;
        let mut spatial = self.spatial.lock().map_err(|_| lock_err("engine.reload"))?;
        spatial.clear();
        Ok(())
    }
}

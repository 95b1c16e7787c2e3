//! Core configuration.
//!
//! Every tunable is supplied in one explicit object at construction time:
//! per-metric good directions, cache TTL and capacity, spatial cell size,
//! and scheduler debounce. There is no ambient global state, so multiple
//! independent cores (one per test, one per document) never interfere.
//!
//! Directions deliberately have no default. Best/worst computations on a
//! metric without a configured direction fail with a configuration error
//! instead of silently assuming "higher is better".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::metric::stats::Direction;
use crate::orchestrator::SchedulerConfig;
use crate::spatial::SpatialConfig;

/// Configuration for one analytics core instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Good direction per metric id.
    #[serde(default)]
    pub metric_directions: HashMap<String, Direction>,

    /// Compute cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Spatial index tuning.
    #[serde(default)]
    pub spatial: SpatialConfig,

    /// Scheduler tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl CoreConfig {
    /// Adds a metric direction, builder style.
    #[must_use]
    pub fn with_direction(mut self, metric: impl Into<String>, direction: Direction) -> Self {
        self.metric_directions.insert(metric.into(), direction);
        self
    }
}

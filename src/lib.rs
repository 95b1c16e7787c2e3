//! # terrastat - Analytics core for spatial scenario planning
//!
//! terrastat turns raw spatial entities into displayable metrics for
//! scenario-planning tools: a multi-dimensional metric store with secondary
//! indices, token-based value resolution, a TTL/capacity-bounded compute
//! cache for derived aggregates, a grid-hashed spatial index, and a
//! dependency-aware pipeline orchestrator.
//!
//! ## Core Concepts
//!
//! - **MetricKey**: composite identifier `{analysis, metric, scenario,
//!   filter}` for one stored result
//! - **MetricStatistics**: derived best/worst/average/median/rankings over
//!   the scenarios of an (analysis, metric) pair
//! - **Token**: symbolic placeholder ("best-scenario", "average-value",
//!   "rank-N", ...) resolved at read time into a typed value
//! - **Selection fingerprint**: deterministic digest of a selected entity
//!   set, scoping cached aggregates
//! - **Pipeline**: named steps with declared error policies, triggered on
//!   demand, on a period, or reactively with debouncing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use terrastat::{AnalyticsCore, CoreConfig, Direction, MetricKey, MetricResult};
//!
//! let config = CoreConfig::default().with_direction("avg_utci", Direction::LowerIsBetter);
//! let core = AnalyticsCore::new(&config)?;
//!
//! let key = MetricKey::unfiltered("thermal", "avg_utci", "base")?;
//! core.metrics().set_result(key, MetricResult::new(23.5)?)?;
//!
//! let best = core.resolve_token("best-scenario", "thermal", "avg_utci", "base", "base")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod metric;
pub mod orchestrator;
pub mod spatial;
pub mod token;

// Re-export primary types at crate root for convenience
pub use cache::{CacheConfig, CacheKey, ComputeCache, SelectionFingerprint};
pub use config::CoreConfig;
pub use engine::{AnalyticsCore, ENTITIES_STATE_KEY};
pub use entity::{Entity, EntityId, Position};
pub use error::{
    ComputationError, ConfigurationError, ExecutionError, TerraError, TerraResult,
    ValidationError,
};
pub use metric::{
    Direction, MetricKey, MetricResult, MetricStatistics, MetricStore, RankedScenario,
    ScenarioValue,
};
pub use orchestrator::{
    ErrorPolicy, ErrorReport, ErrorReporter, MemoryReporter, Orchestrator, Pipeline,
    PipelineOutcome, PipelineRunReport, PipelineState, PipelineStep, ScheduleHandle,
    SchedulerConfig, StepStatus, TracingReporter,
};
pub use spatial::{GridBounds, SpatialConfig, SpatialIndex};
pub use token::{ResolutionContext, Token, TokenKind, TokenValue};

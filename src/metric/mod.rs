//! Metric domain: composite keys, stored results, derived statistics, and
//! the indexed store.

pub mod key;
pub mod result;
pub mod stats;
pub mod store;

pub use key::MetricKey;
pub use result::MetricResult;
pub use stats::{Direction, MetricStatistics, RankedScenario, ScenarioValue};
pub use store::MetricStore;

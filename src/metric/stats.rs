//! Derived cross-scenario statistics.
//!
//! Statistics are computed from the current set of results sharing an
//! (analysis, metric) pair, never independently settable. All orderings are
//! deterministic: value order per the configured direction, ties broken by
//! scenario-key lexical order.

use serde::{Deserialize, Serialize};

/// Which way a metric improves.
///
/// Supplied per metric by configuration. There is deliberately no default:
/// a silent "higher is better" would invert best/worst for metrics like
/// cost or temperature deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Larger values are better.
    HigherIsBetter,
    /// Smaller values are better.
    LowerIsBetter,
}

/// A scenario paired with its metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioValue {
    /// Scenario key.
    pub scenario: String,
    /// Metric value in that scenario.
    pub value: f64,
}

/// One entry of the cross-scenario ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedScenario {
    /// Scenario key.
    pub scenario: String,
    /// Metric value in that scenario.
    pub value: f64,
    /// 1-based rank; rank 1 is the best scenario per the direction.
    pub rank: usize,
}

/// Cross-scenario statistics for one (analysis, metric) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    /// Best scenario per the configured direction.
    pub best: ScenarioValue,
    /// Worst scenario per the configured direction.
    pub worst: ScenarioValue,
    /// Arithmetic mean across scenarios.
    pub average: f64,
    /// Median across scenarios (mean of the middle pair for even counts).
    pub median: f64,
    /// All scenarios ordered best-first; ranks are a contiguous 1..n
    /// permutation.
    pub rankings: Vec<RankedScenario>,
}

/// Computes statistics over per-scenario samples.
///
/// Returns `None` for an empty sample set; absence of data is not an error.
#[must_use]
pub(crate) fn compute(
    mut samples: Vec<(String, f64)>,
    direction: Direction,
) -> Option<MetricStatistics> {
    if samples.is_empty() {
        return None;
    }

    samples.sort_by(|(sa, va), (sb, vb)| {
        let by_value = match direction {
            Direction::HigherIsBetter => vb.total_cmp(va),
            Direction::LowerIsBetter => va.total_cmp(vb),
        };
        by_value.then_with(|| sa.cmp(sb))
    });

    let n = samples.len();
    let sum: f64 = samples.iter().map(|(_, v)| v).sum();
    let average = sum / n as f64;

    // Median over value order, independent of direction.
    let mut values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
    values.sort_by(f64::total_cmp);
    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };

    let rankings: Vec<RankedScenario> = samples
        .into_iter()
        .enumerate()
        .map(|(i, (scenario, value))| RankedScenario {
            scenario,
            value,
            rank: i + 1,
        })
        .collect();

    let first = &rankings[0];
    let last = &rankings[n - 1];

    Some(MetricStatistics {
        best: ScenarioValue {
            scenario: first.scenario.clone(),
            value: first.value,
        },
        worst: ScenarioValue {
            scenario: last.scenario.clone(),
            value: last.value,
        },
        average,
        median,
        rankings,
    })
}

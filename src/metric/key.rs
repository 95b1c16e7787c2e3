//! Composite metric keys.
//!
//! A `MetricKey` identifies exactly one stored result by
//! (analysis, metric, scenario, filter). The canonical wire form is the
//! `::`-joined string `analysis::metric::scenario::filter`; it is the only
//! serialization boundary for keys, and round-trips exactly.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Delimiter joining the four key components in the canonical string form.
pub const KEY_DELIMITER: &str = "::";

/// Canonical sentinel for "all scenarios" / "no filter".
pub const ALL: &str = "all";

fn validate_component(
    component: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyKeyComponent { component });
    }
    // A component must neither contain the delimiter nor touch it with a
    // bare ':' at either end; both would make the joined form ambiguous.
    if value.contains(KEY_DELIMITER) || value.starts_with(':') || value.ends_with(':') {
        return Err(ValidationError::DelimiterInKeyComponent {
            component,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Composite identifier `{analysis, metric, scenario, filter}` for one
/// stored metric result.
///
/// Construction fails fast on empty or delimiter-bearing components; a key
/// that exists is always serializable, and the same four-tuple serializes
/// identically regardless of call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    analysis: String,
    metric: String,
    scenario: String,
    filter: String,
}

impl MetricKey {
    /// Creates a key from its four components.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if any component is empty, contains the
    /// `::` delimiter, or begins/ends with `:`.
    pub fn new(
        analysis: impl Into<String>,
        metric: impl Into<String>,
        scenario: impl Into<String>,
        filter: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let analysis = analysis.into();
        let metric = metric.into();
        let scenario = scenario.into();
        let filter = filter.into();

        validate_component("analysis", &analysis)?;
        validate_component("metric", &metric)?;
        validate_component("scenario", &scenario)?;
        validate_component("filter", &filter)?;

        Ok(Self {
            analysis,
            metric,
            scenario,
            filter,
        })
    }

    /// Creates a key with the canonical `"all"` filter sentinel.
    pub fn unfiltered(
        analysis: impl Into<String>,
        metric: impl Into<String>,
        scenario: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::new(analysis, metric, scenario, ALL)
    }

    /// Parses the canonical `analysis::metric::scenario::filter` form.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MalformedKeyString` when the input does not
    /// split into exactly four components, or a component-level error when a
    /// component is invalid.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = input.split(KEY_DELIMITER).collect();
        if parts.len() != 4 {
            return Err(ValidationError::MalformedKeyString {
                input: input.to_string(),
                found: parts.len(),
            });
        }
        Self::new(parts[0], parts[1], parts[2], parts[3])
    }

    /// The analysis component.
    #[must_use]
    pub fn analysis(&self) -> &str {
        &self.analysis
    }

    /// The metric component.
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// The scenario component.
    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// The filter component.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Returns this key re-targeted at another scenario.
    ///
    /// Used when a resolved token substitutes a concrete scenario into a
    /// key before lookup.
    pub fn with_scenario(&self, scenario: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(
            self.analysis.clone(),
            self.metric.clone(),
            scenario,
            self.filter.clone(),
        )
    }

    /// The canonical string form.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}{d}{}{d}{}{d}{}",
            self.analysis,
            self.metric,
            self.scenario,
            self.filter,
            d = KEY_DELIMITER
        )
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl FromStr for MetricKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for MetricKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

//! Stored metric results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One computed metric value.
///
/// Immutable once stored: a new computation replaces the record wholesale
/// rather than mutating it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// The computed value.
    pub value: f64,

    /// When the value was computed.
    pub computed_at: DateTime<Utc>,

    /// Opaque calculator-supplied metadata (units, sample counts, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl MetricResult {
    /// Creates a result computed now.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonFiniteValue` for NaN or infinite values;
    /// they would poison the deterministic ordering of rankings.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        Self::at(value, Utc::now())
    }

    /// Creates a result with an explicit computation timestamp.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonFiniteValue` for NaN or infinite values.
    pub fn at(value: f64, computed_at: DateTime<Utc>) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { value });
        }
        Ok(Self {
            value,
            computed_at,
            metadata: None,
        })
    }

    /// Attaches opaque metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

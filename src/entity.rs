//! Ingestion-boundary types: entity identity, position, and properties.
//!
//! Entities are owned by the ingestion layer. The analytics core holds only
//! identifiers and values derived from entities, never the entity records
//! themselves, so there is a single copy of mutable entity state in the
//! process.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Stable, opaque entity identifier.
///
/// Always an externally assigned string, never a positional index:
/// identifiers must survive reordering, partial reloads, and asynchronous
/// merges of the upstream dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wraps an externally assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A 2D coordinate in a consistent projected unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Easting / x coordinate.
    pub x: f64,
    /// Northing / y coordinate.
    pub y: f64,
}

impl Position {
    /// Creates a position, rejecting non-finite coordinates.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonFinitePosition` if either coordinate is
    /// NaN or infinite. Such positions must never reach the spatial index:
    /// they would corrupt cell-key computation and silently vanish from
    /// queries.
    pub fn new(x: f64, y: f64) -> Result<Self, ValidationError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ValidationError::NonFinitePosition { x, y });
        }
        Ok(Self { x, y })
    }

    /// Euclidean distance to another position.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.hypot(dy)
    }
}

/// An identifiable spatial or non-spatial record at the ingestion boundary.
///
/// Properties are scalar or categorical values keyed by name. The core never
/// stores these records; they exist so ingestion and the orchestrator share
/// one vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier.
    pub id: EntityId,
    /// Optional 2D position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Named scalar or categorical properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    /// Creates an entity with no position and no properties.
    #[must_use]
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            position: None,
            properties: BTreeMap::new(),
        }
    }

    /// Creates an entity at a position.
    #[must_use]
    pub fn at(id: impl Into<EntityId>, position: Position) -> Self {
        Self {
            id: id.into(),
            position: Some(position),
            properties: BTreeMap::new(),
        }
    }

    /// Sets a named property, replacing any previous value.
    pub fn set_property(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.properties.insert(name.into(), value);
    }
}

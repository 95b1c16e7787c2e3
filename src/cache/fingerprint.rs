//! Deterministic selection fingerprints.
//!
//! A fingerprint summarizes a set of selected entity identifiers as a
//! fixed-length string for use as a cache-key component. The digest is
//! order-insensitive (identifiers are sorted and de-duplicated before
//! hashing) and stable across processes.

use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Hex length of a fingerprint: a 16-byte BLAKE3 prefix.
///
/// Truncating the 32-byte digest keeps keys short at any selection
/// cardinality; the added collision risk at 128 bits is accepted.
pub const FINGERPRINT_HEX_LEN: usize = 32;

/// Deterministic digest of a selected identifier set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionFingerprint(String);

impl SelectionFingerprint {
    /// Fingerprints a set of entity identifiers.
    ///
    /// Duplicates and ordering do not affect the result: the same logical
    /// selection always produces the same fingerprint.
    #[must_use]
    pub fn of<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut sorted: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut hasher = Hasher::new();
        for id in &sorted {
            hasher.update(id.as_bytes());
            // Separator prevents ["ab"] and ["a", "b"] from colliding.
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(FINGERPRINT_HEX_LEN);
        for byte in &digest.as_bytes()[..FINGERPRINT_HEX_LEN / 2] {
            use fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Fingerprints a slice of entity ids.
    #[must_use]
    pub fn of_entities(ids: &[EntityId]) -> Self {
        Self::of(ids.iter().map(EntityId::as_str))
    }

    /// The fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

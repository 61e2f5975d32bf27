//! The normalized query and its hint structure.

use serde::{Deserialize, Serialize};

/// Out-of-band facts discovered during normalization.
///
/// A dedicated struct with known optional fields; hint data never travels
/// as a loose string map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct QueryHints {
    /// `Some(true)` for "with peel", `Some(false)` for "without peel".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peel: Option<bool>,
    /// Set when the input names something alignment must ignore outright
    /// (e.g. the `deprecated` sentinel).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored_class: Option<String>,
    /// Compound tokens that were preserved as single units.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub compound_preserved: Vec<String>,
    /// Free-form annotation for known low-confidence name mappings; carried
    /// through to telemetry untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_confidence_note: Option<String>,
}

/// Canonical view of one food query, immutable once derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedQuery {
    /// Cleaned, lowercased display name with compounds in natural spelling.
    pub canonical_name: String,
    /// Ordered, deduplicated tokens; compounds joined with underscores.
    pub tokens: Vec<String>,
    /// Normalized cooking form (`raw`, `roasted`, `scrambled`, ...), if known.
    pub form: Option<String>,
    /// Concrete cooking method for conversion, when derivable from the form.
    pub method: Option<String>,
    /// Core class key (`grape`, `sweet_potato`, `brussels_sprouts`, ...).
    pub core_class: String,
    pub hints: QueryHints,
}

impl NormalizedQuery {
    /// Whether normalization decided this query must be ignored.
    pub fn is_ignored(&self) -> bool {
        self.hints.ignored_class.is_some()
    }

    /// Stage Z lookup keys in priority order.
    ///
    /// The most specific key is the underscored canonical name plus the
    /// cooking descriptor (`brussels_sprouts_roasted`), then the underscored
    /// name alone (`egg_white`), then the core class with and without the
    /// descriptor.
    pub fn fallback_key_candidates(&self) -> Vec<String> {
        let name_key = self.canonical_name.replace(' ', "_");
        let descriptor = self
            .method
            .as_deref()
            .or(self.form.as_deref())
            .filter(|d| *d != "raw" && *d != "cooked");

        let mut keys = Vec::with_capacity(4);
        if let Some(descriptor) = descriptor {
            keys.push(format!("{name_key}_{descriptor}"));
        }
        keys.push(name_key);
        if let Some(descriptor) = descriptor {
            keys.push(format!("{}_{}", self.core_class, descriptor));
        }
        keys.push(self.core_class.clone());
        keys.dedup();
        keys
    }
}

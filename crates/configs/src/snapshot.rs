//! The frozen configuration snapshot.
//!
//! A snapshot is the unit the engine is constructed with: every document,
//! already parsed and validated, plus the composite fingerprint of the bytes
//! they were loaded from. Loading is atomic: a parse or validation failure
//! in any document aborts with no partial state exposed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::documents::{
    BrandedFallbacks, CategoryAllowlist, ClassThresholds, CookConversions, EnergyGuards,
    FeatureFlags, NegativeVocabulary, UnitToGrams, Variants,
};
use crate::error::ConfigError;
use crate::fingerprint::{fingerprint_documents, sha256_hex};
use crate::recipes::{load_templates, RecipeTemplate};

const REQUIRED_DOCUMENT: &str = "class_thresholds.yml";

/// Immutable, fingerprinted composition of every configuration document.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    class_thresholds: ClassThresholds,
    negative_vocabulary: NegativeVocabulary,
    feature_flags: FeatureFlags,
    variants: Variants,
    category_allowlist: CategoryAllowlist,
    branded_fallbacks: BrandedFallbacks,
    energy_guards: EnergyGuards,
    unit_to_grams: UnitToGrams,
    cook_conversions: CookConversions,
    recipes: Vec<RecipeTemplate>,
    fingerprint: String,
    document_hashes: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    /// Load the full document set from `dir`.
    ///
    /// `class_thresholds.yml` must exist; every other document falls back to
    /// its typed default when absent. Recipe templates are read from the
    /// `recipes/` subdirectory in sorted file order.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let mut document_hashes = BTreeMap::new();

        let class_thresholds: ClassThresholds =
            match load_document(dir, REQUIRED_DOCUMENT, &mut document_hashes)? {
                Some(doc) => doc,
                None => return Err(ConfigError::Missing(REQUIRED_DOCUMENT.to_string())),
            };
        class_thresholds.validate()?;

        let negative_vocabulary: NegativeVocabulary =
            load_document(dir, "negative_vocabulary.yml", &mut document_hashes)?
                .unwrap_or_default();
        let feature_flags: FeatureFlags =
            load_document(dir, "feature_flags.yml", &mut document_hashes)?.unwrap_or_default();
        feature_flags.validate()?;
        let variants: Variants =
            load_document(dir, "variants.yml", &mut document_hashes)?.unwrap_or_default();
        let category_allowlist: CategoryAllowlist =
            load_document(dir, "category_allowlist.yml", &mut document_hashes)?
                .unwrap_or_default();
        let branded_fallbacks: BrandedFallbacks =
            load_document(dir, "branded_fallbacks.yml", &mut document_hashes)?.unwrap_or_default();
        branded_fallbacks.validate()?;
        let energy_guards: EnergyGuards =
            load_document(dir, "energy_guards.yml", &mut document_hashes)?.unwrap_or_default();
        energy_guards.validate()?;
        let unit_to_grams: UnitToGrams =
            load_document(dir, "unit_to_grams.yml", &mut document_hashes)?.unwrap_or_default();
        unit_to_grams.validate()?;
        let cook_conversions: CookConversions =
            load_document(dir, "cook_conversions.yml", &mut document_hashes)?.unwrap_or_default();
        cook_conversions.validate()?;

        let recipes = load_templates(&dir.join("recipes"))?;
        for template in &recipes {
            document_hashes.insert(
                format!("recipes/{}", template.source_file),
                template.sha256.clone(),
            );
        }

        let fingerprint = fingerprint_documents(&document_hashes);
        debug!(fingerprint = %fingerprint, documents = document_hashes.len(), "config snapshot loaded");

        Ok(Self {
            class_thresholds,
            negative_vocabulary,
            feature_flags,
            variants,
            category_allowlist,
            branded_fallbacks,
            energy_guards,
            unit_to_grams,
            cook_conversions,
            recipes,
            fingerprint,
            document_hashes,
        })
    }

    /// Snapshot built entirely from typed defaults.
    ///
    /// The fingerprint is computed over the canonical YAML serialization of
    /// each default document, so two default snapshots always agree.
    pub fn default_snapshot() -> Self {
        Self::from_parts(
            ClassThresholds::default(),
            NegativeVocabulary::default(),
            FeatureFlags::default(),
            Variants::default(),
            CategoryAllowlist::default(),
            BrandedFallbacks::default(),
            EnergyGuards::default(),
            UnitToGrams::default(),
            CookConversions::default(),
            Vec::new(),
        )
    }

    /// Assemble a snapshot from already-built documents.
    ///
    /// Used by tests and embedders that construct configuration in code; the
    /// fingerprint is derived from each document's canonical serialization.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        class_thresholds: ClassThresholds,
        negative_vocabulary: NegativeVocabulary,
        feature_flags: FeatureFlags,
        variants: Variants,
        category_allowlist: CategoryAllowlist,
        branded_fallbacks: BrandedFallbacks,
        energy_guards: EnergyGuards,
        unit_to_grams: UnitToGrams,
        cook_conversions: CookConversions,
        recipes: Vec<RecipeTemplate>,
    ) -> Self {
        let mut document_hashes = BTreeMap::new();
        let mut record = |name: &str, serialized: Result<String, serde_yaml::Error>| {
            if let Ok(text) = serialized {
                document_hashes.insert(name.to_string(), sha256_hex(text.as_bytes()));
            }
        };
        record(REQUIRED_DOCUMENT, serde_yaml::to_string(&class_thresholds));
        record(
            "negative_vocabulary.yml",
            serde_yaml::to_string(&negative_vocabulary),
        );
        record("feature_flags.yml", serde_yaml::to_string(&feature_flags));
        record("variants.yml", serde_yaml::to_string(&variants));
        record(
            "category_allowlist.yml",
            serde_yaml::to_string(&category_allowlist),
        );
        record(
            "branded_fallbacks.yml",
            serde_yaml::to_string(&branded_fallbacks),
        );
        record("energy_guards.yml", serde_yaml::to_string(&energy_guards));
        record("unit_to_grams.yml", serde_yaml::to_string(&unit_to_grams));
        record(
            "cook_conversions.yml",
            serde_yaml::to_string(&cook_conversions),
        );
        for template in &recipes {
            let name = format!("recipes/{}", template.source_file);
            record(&name, serde_yaml::to_string(template));
        }
        let fingerprint = fingerprint_documents(&document_hashes);

        Self {
            class_thresholds,
            negative_vocabulary,
            feature_flags,
            variants,
            category_allowlist,
            branded_fallbacks,
            energy_guards,
            unit_to_grams,
            cook_conversions,
            recipes,
            fingerprint,
            document_hashes,
        }
    }

    /// The composite `configs@<12-hex>` fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Per-document SHA-256 digests, keyed by document name.
    pub fn document_hashes(&self) -> &BTreeMap<String, String> {
        &self.document_hashes
    }

    pub fn class_thresholds(&self) -> &ClassThresholds {
        &self.class_thresholds
    }

    pub fn negative_vocabulary(&self) -> &NegativeVocabulary {
        &self.negative_vocabulary
    }

    pub fn feature_flags(&self) -> &FeatureFlags {
        &self.feature_flags
    }

    pub fn variants(&self) -> &Variants {
        &self.variants
    }

    pub fn category_allowlist(&self) -> &CategoryAllowlist {
        &self.category_allowlist
    }

    pub fn branded_fallbacks(&self) -> &BrandedFallbacks {
        &self.branded_fallbacks
    }

    pub fn energy_guards(&self) -> &EnergyGuards {
        &self.energy_guards
    }

    pub fn unit_to_grams(&self) -> &UnitToGrams {
        &self.unit_to_grams
    }

    pub fn cook_conversions(&self) -> &CookConversions {
        &self.cook_conversions
    }

    pub fn recipes(&self) -> &[RecipeTemplate] {
        &self.recipes
    }
}

/// Read and parse one optional document, recording its byte hash.
fn load_document<T: serde::de::DeserializeOwned>(
    dir: &Path,
    name: &str,
    document_hashes: &mut BTreeMap<String, String>,
) -> Result<Option<T>, ConfigError> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path).map_err(|source| ConfigError::Io {
        document: name.to_string(),
        source,
    })?;
    document_hashes.insert(name.to_string(), sha256_hex(&bytes));
    let parsed = serde_yaml::from_slice(&bytes).map_err(|source| ConfigError::Parse {
        document: name.to_string(),
        source,
    })?;
    Ok(Some(parsed))
}

//! Typed configuration documents.
//!
//! Each struct here corresponds to one YAML document in the configuration
//! directory. Defaults are expressed through serde default helpers so a
//! sparse document (or a missing optional one) deserializes to the same
//! values the engine would use with no configuration at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Minimum Stage 1b acceptance score per core class.
///
/// The `default` threshold applies to any class without an override. Common
/// overrides in practice: 0.30 for single-token foods (grape, corn), 0.35
/// for ambiguous classes (olive, egg).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassThresholds {
    #[serde(default = "default_threshold")]
    pub default: f64,
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

impl ClassThresholds {
    /// Threshold for a core class, falling back to the document default.
    pub fn for_class(&self, core_class: &str) -> f64 {
        self.overrides
            .get(core_class)
            .copied()
            .unwrap_or(self.default)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let doc = "class_thresholds";
        if !(0.0..=1.0).contains(&self.default) {
            return Err(ConfigError::validation(
                doc,
                format!("default threshold {} outside [0, 1]", self.default),
            ));
        }
        for (class, t) in &self.overrides {
            if !(0.0..=1.0).contains(t) {
                return Err(ConfigError::validation(
                    doc,
                    format!("threshold {t} for {class} outside [0, 1]"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ClassThresholds {
    fn default() -> Self {
        Self {
            default: default_threshold(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Per-class negative vocabulary plus the shared block / synonym lists used
/// by the guardrails and the Stage 1c raw-preference pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NegativeVocabulary {
    /// Class-keyed substrings that penalize or block candidates for that class.
    #[serde(default)]
    pub classes: BTreeMap<String, Vec<String>>,
    /// Substrings that hard-block candidates under produce / leafy intent.
    #[serde(default = "default_produce_hard_blocks")]
    pub produce_hard_blocks: Vec<String>,
    /// Substrings that hard-block candidates under egg intent.
    #[serde(default = "default_eggs_hard_blocks")]
    pub eggs_hard_blocks: Vec<String>,
    /// Processed-form markers that trigger the Stage 1c raw-preference switch.
    #[serde(default = "default_stage1c_processed_penalties")]
    pub stage1c_processed_penalties: Vec<String>,
    /// Raw-form synonyms an alternative must carry to win the 1c switch.
    #[serde(default = "default_stage1c_raw_synonyms")]
    pub stage1c_raw_synonyms: Vec<String>,
    /// Name substrings that short-circuit alignment entirely, mapped to the
    /// ignored-class label reported in telemetry.
    #[serde(default = "default_ignored_classes")]
    pub ignored_classes: BTreeMap<String, String>,
}

impl Default for NegativeVocabulary {
    fn default() -> Self {
        // Must agree with the serde field defaults so a missing document and
        // an in-code default are indistinguishable.
        Self {
            classes: BTreeMap::new(),
            produce_hard_blocks: default_produce_hard_blocks(),
            eggs_hard_blocks: default_eggs_hard_blocks(),
            stage1c_processed_penalties: default_stage1c_processed_penalties(),
            stage1c_raw_synonyms: default_stage1c_raw_synonyms(),
            ignored_classes: default_ignored_classes(),
        }
    }
}

/// Feature flags gating stages and semantic-retrieval knobs.
///
/// Unknown flags in the document are ignored rather than rejected so a newer
/// configuration can be pointed at an older engine during rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureFlags {
    #[serde(default = "true_value")]
    pub allow_stage_z_for_partial_pools: bool,
    #[serde(default)]
    pub strict_cooked_exact_gate: bool,
    #[serde(default = "true_value")]
    pub enable_recipe_decomposition: bool,
    #[serde(default)]
    pub enable_semantic_search: bool,
    #[serde(default = "true_value")]
    pub enable_alignment_caches: bool,
    #[serde(default)]
    pub allow_unverified_branded: bool,
    #[serde(default = "default_semantic_topk")]
    pub semantic_topk: usize,
    #[serde(default = "default_semantic_min_sim")]
    pub semantic_min_sim: f64,
    #[serde(default = "default_semantic_max_cand")]
    pub semantic_max_cand: usize,
}

impl FeatureFlags {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let doc = "feature_flags";
        if self.semantic_topk == 0 {
            return Err(ConfigError::validation(doc, "semantic_topk must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.semantic_min_sim) {
            return Err(ConfigError::validation(
                doc,
                "semantic_min_sim must be within [0, 1]",
            ));
        }
        if self.semantic_max_cand == 0 {
            return Err(ConfigError::validation(doc, "semantic_max_cand must be >= 1"));
        }
        Ok(())
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            allow_stage_z_for_partial_pools: true,
            strict_cooked_exact_gate: false,
            enable_recipe_decomposition: true,
            enable_semantic_search: false,
            enable_alignment_caches: true,
            allow_unverified_branded: false,
            semantic_topk: default_semantic_topk(),
            semantic_min_sim: default_semantic_min_sim(),
            semantic_max_cand: default_semantic_max_cand(),
        }
    }
}

/// Alternate search strings per class, tried alongside the canonical name
/// when building the candidate pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Variants {
    #[serde(default)]
    pub classes: BTreeMap<String, Vec<String>>,
}

impl Variants {
    pub fn for_class(&self, core_class: &str) -> &[String] {
        self.classes
            .get(core_class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Allow / penalize / hard-block substring lists for one class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CategoryRule {
    #[serde(default)]
    pub allow_contains: Vec<String>,
    #[serde(default)]
    pub penalize_contains: Vec<String>,
    #[serde(default)]
    pub hard_block_contains: Vec<String>,
}

/// Per-class category filtering applied before scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CategoryAllowlist {
    #[serde(default)]
    pub classes: BTreeMap<String, CategoryRule>,
}

impl CategoryAllowlist {
    pub fn for_class(&self, core_class: &str) -> Option<&CategoryRule> {
        self.classes.get(core_class)
    }
}

/// One verified Stage Z fallback entry, keyed by canonical class key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandedFallback {
    #[serde(default)]
    pub brand: Option<String>,
    pub fdc_id: i64,
    /// Inclusive kcal/100 g window the resolved entry must fall inside.
    pub kcal_bounds: [f64; 2],
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub reject_patterns: Vec<String>,
    /// Whether the pinned identifier has been verified against a live NDB.
    #[serde(default)]
    pub db_verified: bool,
    #[serde(default)]
    pub note: Option<String>,
}

/// The Stage Z fallback map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BrandedFallbacks {
    #[serde(default)]
    pub entries: BTreeMap<String, BrandedFallback>,
}

impl BrandedFallbacks {
    pub fn get(&self, key: &str) -> Option<&BrandedFallback> {
        self.entries.get(key)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let doc = "branded_fallbacks";
        for (key, entry) in &self.entries {
            if entry.kcal_bounds[0] > entry.kcal_bounds[1] {
                return Err(ConfigError::validation(
                    doc,
                    format!("{key}: kcal_bounds min exceeds max"),
                ));
            }
            if entry.kcal_bounds[0] < 0.0 {
                return Err(ConfigError::validation(
                    doc,
                    format!("{key}: kcal_bounds must be non-negative"),
                ));
            }
        }
        Ok(())
    }
}

/// Per-macro tolerance rule: `min(factor * predicted, floor_g)` grams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroTolerances {
    #[serde(default = "default_protein_factor")]
    pub protein_factor: f64,
    #[serde(default = "default_protein_floor")]
    pub protein_floor_g: f64,
    #[serde(default = "default_carbs_factor")]
    pub carbs_factor: f64,
    #[serde(default = "default_carbs_floor")]
    pub carbs_floor_g: f64,
    #[serde(default = "default_fat_factor")]
    pub fat_factor: f64,
    #[serde(default = "default_fat_floor")]
    pub fat_floor_g: f64,
}

impl Default for MacroTolerances {
    fn default() -> Self {
        Self {
            protein_factor: default_protein_factor(),
            protein_floor_g: default_protein_floor(),
            carbs_factor: default_carbs_factor(),
            carbs_floor_g: default_carbs_floor(),
            fat_factor: default_fat_factor(),
            fat_floor_g: default_fat_floor(),
        }
    }
}

/// Expected macro profile per 100 g for a core class, used as the predicted
/// baseline by the macro guards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MacroPrior {
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fat_g: f64,
}

/// Energy-band tolerances, macro tolerances, and class-level energy priors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyGuards {
    /// Classes that get the tight energy band.
    #[serde(default)]
    pub high_energy_classes: Vec<String>,
    /// Classes that get the loose energy band.
    #[serde(default)]
    pub produce_classes: Vec<String>,
    #[serde(default = "default_high_energy_tolerance")]
    pub high_energy_tolerance: f64,
    #[serde(default = "default_produce_tolerance")]
    pub produce_tolerance: f64,
    #[serde(default = "default_energy_tolerance")]
    pub default_tolerance: f64,
    #[serde(default)]
    pub macro_tolerances: MacroTolerances,
    /// Predicted kcal/100 g per core class; absent classes score energy
    /// similarity as unknown.
    #[serde(default)]
    pub class_energy_priors: BTreeMap<String, f64>,
    /// Predicted macro profile per core class for the macro guards.
    #[serde(default)]
    pub class_macro_priors: BTreeMap<String, MacroPrior>,
    /// Classes that must never resolve through the Stage Z energy-only proxy.
    #[serde(default = "default_never_proxy")]
    pub never_proxy: Vec<String>,
}

impl EnergyGuards {
    /// Class-aware energy band tolerance as a fraction of predicted energy.
    pub fn tolerance_for_class(&self, core_class: &str) -> f64 {
        if self.high_energy_classes.iter().any(|c| c == core_class) {
            self.high_energy_tolerance
        } else if self.produce_classes.iter().any(|c| c == core_class) {
            self.produce_tolerance
        } else {
            self.default_tolerance
        }
    }

    pub fn energy_prior(&self, core_class: &str) -> Option<f64> {
        self.class_energy_priors.get(core_class).copied()
    }

    pub fn macro_prior(&self, core_class: &str) -> Option<MacroPrior> {
        self.class_macro_priors.get(core_class).copied()
    }

    pub fn never_proxy(&self, core_class: &str) -> bool {
        self.never_proxy.iter().any(|c| c == core_class)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let doc = "energy_guards";
        for (label, t) in [
            ("high_energy_tolerance", self.high_energy_tolerance),
            ("produce_tolerance", self.produce_tolerance),
            ("default_tolerance", self.default_tolerance),
        ] {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::validation(
                    doc,
                    format!("{label} {t} outside [0, 1]"),
                ));
            }
        }
        for (class, kcal) in &self.class_energy_priors {
            if *kcal <= 0.0 {
                return Err(ConfigError::validation(
                    doc,
                    format!("class_energy_priors.{class} must be positive"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for EnergyGuards {
    fn default() -> Self {
        Self {
            high_energy_classes: Vec::new(),
            produce_classes: Vec::new(),
            high_energy_tolerance: default_high_energy_tolerance(),
            produce_tolerance: default_produce_tolerance(),
            default_tolerance: default_energy_tolerance(),
            macro_tolerances: MacroTolerances::default(),
            class_energy_priors: BTreeMap::new(),
            class_macro_priors: BTreeMap::new(),
            never_proxy: default_never_proxy(),
        }
    }
}

/// Household unit → grams conversions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UnitToGrams {
    #[serde(default)]
    pub units: BTreeMap<String, f64>,
}

impl UnitToGrams {
    pub fn grams(&self, unit: &str) -> Option<f64> {
        self.units.get(unit).copied()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (unit, grams) in &self.units {
            if *grams <= 0.0 {
                return Err(ConfigError::validation(
                    "unit_to_grams",
                    format!("{unit}: grams must be positive"),
                ));
            }
        }
        Ok(())
    }
}

/// Direction of a cooking mass change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MassChangeKind {
    /// Cooked mass is lower than raw mass (moisture loss).
    Shrinkage,
    /// Cooked mass is higher than raw mass (water uptake).
    Expansion,
}

/// Mass change applied by one cooking method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MassChange {
    #[serde(rename = "type")]
    pub kind: MassChangeKind,
    /// Mean fractional change, e.g. 0.12 for a 12 % shrinkage.
    pub mean: f64,
    /// Observed spread; carried for telemetry, not applied.
    #[serde(default)]
    pub sd: f64,
}

/// Cooking profile for one class + method pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CookProfile {
    pub mass_change: MassChange,
    /// Oil absorbed at the surface, grams per 100 g of cooked food.
    #[serde(default)]
    pub surface_oil_uptake_g_per_100g: f64,
    /// Retention factor per nutrient key (`protein`, `carbs`, `fat`,
    /// `energy`); absent nutrients retain fully.
    #[serde(default)]
    pub nutrient_retention: BTreeMap<String, f64>,
}

/// Per-class per-method cooking profiles plus the fallback method name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CookConversions {
    #[serde(default)]
    pub classes: BTreeMap<String, BTreeMap<String, CookProfile>>,
    /// Method tried when the requested one has no profile for the class.
    #[serde(default = "default_fallback_method")]
    pub fallback_method: String,
}

impl CookConversions {
    /// Resolve the profile for `class` + `method`, falling back to the
    /// class's fallback-method profile when the exact method is absent.
    pub fn resolve(&self, class: &str, method: &str) -> Option<&CookProfile> {
        let methods = self.classes.get(class)?;
        methods
            .get(method)
            .or_else(|| methods.get(&self.fallback_method))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let doc = "cook_conversions";
        for (class, methods) in &self.classes {
            for (method, profile) in methods {
                let mean = profile.mass_change.mean;
                // Shrinkage cannot remove more than the whole mass;
                // expansion (water uptake) can multiply it.
                let valid = match profile.mass_change.kind {
                    MassChangeKind::Shrinkage => (0.0..1.0).contains(&mean),
                    MassChangeKind::Expansion => (0.0..=4.0).contains(&mean),
                };
                if !valid {
                    return Err(ConfigError::validation(
                        doc,
                        format!("{class}.{method}: implausible mass change mean {mean}"),
                    ));
                }
                for (nutrient, retention) in &profile.nutrient_retention {
                    if !(0.0..=1.5).contains(retention) {
                        return Err(ConfigError::validation(
                            doc,
                            format!("{class}.{method}: retention for {nutrient} outside [0, 1.5]"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for CookConversions {
    fn default() -> Self {
        Self {
            classes: BTreeMap::new(),
            fallback_method: default_fallback_method(),
        }
    }
}

fn default_threshold() -> f64 {
    0.50
}
fn true_value() -> bool {
    true
}
fn default_semantic_topk() -> usize {
    10
}
fn default_semantic_min_sim() -> f64 {
    0.62
}
fn default_semantic_max_cand() -> usize {
    10
}
fn default_high_energy_tolerance() -> f64 {
    0.20
}
fn default_produce_tolerance() -> f64 {
    0.40
}
fn default_energy_tolerance() -> f64 {
    0.30
}
fn default_protein_factor() -> f64 {
    2.0
}
fn default_protein_floor() -> f64 {
    5.0
}
fn default_carbs_factor() -> f64 {
    2.5
}
fn default_carbs_floor() -> f64 {
    10.0
}
fn default_fat_factor() -> f64 {
    3.0
}
fn default_fat_floor() -> f64 {
    3.0
}
fn default_fallback_method() -> String {
    "dry_heat".to_string()
}

fn default_never_proxy() -> Vec<String> {
    ["produce", "leafy_or_crucifer", "nuts"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_ignored_classes() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for term in ["wine", "beer", "vodka", "whiskey", "cocktail", "liqueur"] {
        map.insert(term.to_string(), "alcoholic_beverage".to_string());
    }
    map.insert("deprecated".to_string(), "deprecated".to_string());
    map
}

fn default_produce_hard_blocks() -> Vec<String> {
    [
        "pickled",
        "canned",
        "frozen",
        "juice",
        "dried",
        "dehydrated",
        "syrup",
        "sweetened",
        "oil",
        "soup",
        "cheese",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_eggs_hard_blocks() -> Vec<String> {
    [
        "yolk raw frozen",
        "white raw frozen",
        "mixture",
        "pasteurized",
        "substitute",
        "powder",
        "bread",
        "toast",
        "roll",
        "bun",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_stage1c_processed_penalties() -> Vec<String> {
    [
        "frozen",
        "pickled",
        "canned",
        "brined",
        "cured",
        "stuffed",
        "powder",
        "dehydrated",
        "dried",
        "in syrup",
        "in juice",
        "oil",
        "sauce",
        "soup",
        "cheese",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_stage1c_raw_synonyms() -> Vec<String> {
    ["raw", "fresh", "uncooked", "unprocessed"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

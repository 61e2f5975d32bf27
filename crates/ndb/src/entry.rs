//! The nutrition database entry model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Advisory tolerance for the Atwater 4/4/9 consistency check.
pub const ATWATER_TOLERANCE: f64 = 0.25;

/// Source partition within the database.
///
/// Foundation and legacy entries are single-ingredient canonical foods;
/// branded entries are commercial products and are excluded from several
/// stages (raw direct matching, the semantic index).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Foundation,
    Legacy,
    Branded,
}

/// Cooking-state tag carried by an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FormTag {
    Raw,
    Cooked,
    #[default]
    Unknown,
}

/// Nutrients per 100 g of the entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Nutrients {
    pub energy_kcal: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    /// Optional micronutrients, keyed by name, per 100 g.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micros: Option<BTreeMap<String, f64>>,
}

impl Nutrients {
    /// Energy implied by the 4/4/9 Atwater factors.
    pub fn atwater_kcal(&self) -> f64 {
        self.protein_g * 4.0 + self.carbs_g * 4.0 + self.fat_g * 9.0
    }

    /// Advisory check that stated energy agrees with the Atwater estimate
    /// within `tolerance` (a fraction of stated energy). Zero-energy rows
    /// pass trivially.
    pub fn atwater_check(&self, tolerance: f64) -> bool {
        if self.energy_kcal <= 0.0 {
            return true;
        }
        let delta = (self.atwater_kcal() - self.energy_kcal).abs();
        delta <= self.energy_kcal * tolerance
    }

    /// Scale the per-100 g profile to a total for `mass_g` grams.
    pub fn scaled_to_mass(&self, mass_g: f64) -> Nutrients {
        let factor = mass_g / 100.0;
        Nutrients {
            energy_kcal: self.energy_kcal * factor,
            protein_g: self.protein_g * factor,
            carbs_g: self.carbs_g * factor,
            fat_g: self.fat_g * factor,
            micros: self.micros.as_ref().map(|micros| {
                micros
                    .iter()
                    .map(|(name, value)| (name.clone(), value * factor))
                    .collect()
            }),
        }
    }
}

/// One entry in the nutrition database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FoodEntry {
    pub fdc_id: i64,
    pub name: String,
    pub source: SourceTag,
    #[serde(default)]
    pub form: FormTag,
    pub nutrients: Nutrients,
}

impl FoodEntry {
    /// Lowercased name, the form every substring filter operates on.
    pub fn name_lower(&self) -> String {
        self.name.to_lowercase()
    }
}

//! Raw-seed cooking conversion.
//!
//! Stage 2 of the alignment cascade takes a raw foundation entry (the
//! "seed"), a cooking method, and a raw mass, and produces the cooked
//! nutrient profile deterministically from the configured method profile:
//! mass shrinkage or expansion, per-nutrient retention over the mass ratio,
//! and optional surface oil uptake. No randomness: the profile's `sd` is
//! carried for telemetry only.
//!
//! The seed guardrail is strict by design: only `foundation` + `raw` entries
//! whose names carry no processed markers are convertible. Everything else
//! is rejected with a reason the cascade records before moving on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use configs::{CookConversions, MassChangeKind};
use ndb::{FoodEntry, FormTag, Nutrients, SourceTag, ATWATER_TOLERANCE};

/// Name markers that disqualify a seed: already-cooked or processed foods
/// must never be run through a raw conversion.
const PROCESSED_SEED_MARKERS: &[&str] = &[
    "pancake",
    "cracker",
    "soup",
    "pastry",
    "babyfood",
    "fried",
    "baked",
    "roasted",
    "grilled",
    "fast foods",
];

/// Errors produced by the cook converter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConvertError {
    /// The seed entry failed the foundation+raw guardrail.
    #[error("stage2_seed_guardrail failed: {reason}")]
    SeedGuardrail { reason: String },

    /// No profile exists for the class/method pair, including the fallback.
    #[error("conversion_unsupported: no profile for class {class} method {method}")]
    Unsupported { class: String, method: String },

    /// The requested mass is not a positive quantity.
    #[error("conversion requires a positive mass, got {0}")]
    NonPositiveMass(f64),
}

/// Record of what a conversion did, carried into telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionSteps {
    pub method: String,
    /// Signed fractional mass change actually applied (negative = shrinkage).
    pub mass_change_applied: f64,
    /// Cooked mass over raw mass.
    pub mass_ratio: f64,
    /// Retention factors applied per nutrient.
    pub retention: BTreeMap<String, f64>,
    /// Energy added by surface oil uptake, kcal per 100 g, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oil_uptake_kcal_per_100g: Option<f64>,
    /// Advisory Atwater re-check on the converted row.
    pub atwater_ok: bool,
}

/// A converted entry plus the cooked mass and the applied steps.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutcome {
    /// The seed with cooked nutrients per 100 g and the form tag flipped.
    pub entry: FoodEntry,
    /// Cooked mass in grams.
    pub mass_g: f64,
    pub steps: ConversionSteps,
}

/// Validate that `seed` is convertible: foundation source, raw form, and a
/// name free of processed markers.
pub fn validate_seed(seed: &FoodEntry) -> Result<(), ConvertError> {
    if seed.source != SourceTag::Foundation {
        return Err(ConvertError::SeedGuardrail {
            reason: format!("seed source is {:?}, requires foundation", seed.source),
        });
    }
    if seed.form != FormTag::Raw {
        return Err(ConvertError::SeedGuardrail {
            reason: format!("seed form is {:?}, requires raw", seed.form),
        });
    }
    let name = seed.name_lower();
    if let Some(marker) = PROCESSED_SEED_MARKERS.iter().find(|m| name.contains(*m)) {
        return Err(ConvertError::SeedGuardrail {
            reason: format!("seed name contains processed marker \"{marker}\""),
        });
    }
    Ok(())
}

/// Convert a raw seed to its cooked profile.
///
/// `class` selects the profile family (usually the query's core class);
/// `method` the concrete technique. When the exact method has no profile the
/// class's fallback method is used; when the class has none at all the
/// conversion is unsupported and the cascade moves on.
pub fn convert(
    seed: &FoodEntry,
    class: &str,
    method: &str,
    mass_g: f64,
    conversions: &CookConversions,
) -> Result<ConversionOutcome, ConvertError> {
    validate_seed(seed)?;
    if mass_g <= 0.0 {
        return Err(ConvertError::NonPositiveMass(mass_g));
    }

    let profile = conversions
        .resolve(class, method)
        .ok_or_else(|| ConvertError::Unsupported {
            class: class.to_string(),
            method: method.to_string(),
        })?;

    let sign = match profile.mass_change.kind {
        MassChangeKind::Expansion => 1.0,
        MassChangeKind::Shrinkage => -1.0,
    };
    let mass_change_applied = sign * profile.mass_change.mean;
    let cooked_mass = mass_g * (1.0 + mass_change_applied);
    let mass_ratio = cooked_mass / mass_g;

    let retention_for = |nutrient: &str| -> f64 {
        profile
            .nutrient_retention
            .get(nutrient)
            .copied()
            .unwrap_or(1.0)
    };

    let raw = &seed.nutrients;
    let mut cooked = Nutrients {
        energy_kcal: raw.energy_kcal * retention_for("energy") / mass_ratio,
        protein_g: raw.protein_g * retention_for("protein") / mass_ratio,
        carbs_g: raw.carbs_g * retention_for("carbs") / mass_ratio,
        fat_g: raw.fat_g * retention_for("fat") / mass_ratio,
        micros: raw.micros.as_ref().map(|micros| {
            micros
                .iter()
                .map(|(name, value)| (name.clone(), value * retention_for(name) / mass_ratio))
                .collect()
        }),
    };

    // Surface oil shows up as added fat plus its 9 kcal/g energy.
    let oil_uptake_kcal = if profile.surface_oil_uptake_g_per_100g > 0.0 {
        let oil_g = profile.surface_oil_uptake_g_per_100g;
        let oil_kcal = oil_g * 9.0;
        cooked.fat_g += oil_g;
        cooked.energy_kcal += oil_kcal;
        Some(oil_kcal)
    } else {
        None
    };

    let atwater_ok = cooked.atwater_check(ATWATER_TOLERANCE);
    debug!(
        seed = %seed.name,
        class,
        method,
        mass_ratio,
        atwater_ok,
        "cook conversion applied"
    );

    let steps = ConversionSteps {
        method: method.to_string(),
        mass_change_applied,
        mass_ratio,
        retention: profile.nutrient_retention.clone(),
        oil_uptake_kcal_per_100g: oil_uptake_kcal,
        atwater_ok,
    };

    let mut entry = seed.clone();
    entry.form = FormTag::Cooked;
    entry.nutrients = cooked;

    Ok(ConversionOutcome {
        entry,
        mass_g: cooked_mass,
        steps,
    })
}

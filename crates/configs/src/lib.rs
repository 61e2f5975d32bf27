//! Externalized configuration for the food-alignment pipeline.
//!
//! Every behavioral knob of the staged matcher lives in a small set of YAML
//! documents loaded from a single directory. The loader is atomic: either the
//! whole document set parses and validates, or nothing is exposed. The bytes
//! of each document are SHA-256 hashed and folded into one composite
//! fingerprint (`configs@<12-hex>`) so a run can always be traced back to the
//! exact configuration that produced it.
//!
//! The snapshot returned by [`ConfigSnapshot::load_dir`] is immutable; any
//! mutation after load is a bug, which is why no `&mut` accessors exist.
//!
//! # Documents
//!
//! | file | contents |
//! |------|----------|
//! | `class_thresholds.yml` | minimum Stage 1b acceptance score per core class (required) |
//! | `negative_vocabulary.yml` | hard-block / penalty substrings per class |
//! | `feature_flags.yml` | stage gates and semantic-retrieval knobs |
//! | `variants.yml` | alternate search strings per class |
//! | `category_allowlist.yml` | allow / penalize / hard-block substrings per class |
//! | `branded_fallbacks.yml` | Stage Z verified fallback map |
//! | `energy_guards.yml` | energy-band tolerances, macro tolerances, class priors |
//! | `unit_to_grams.yml` | household unit conversions |
//! | `cook_conversions.yml` | per-class per-method cooking profiles |
//! | `recipes/*.yml` | one decomposition template per file |
//!
//! Only `class_thresholds.yml` is required; every other document falls back
//! to its typed default when absent.

mod documents;
mod error;
mod fingerprint;
mod recipes;
mod snapshot;

pub use documents::{
    BrandedFallback, BrandedFallbacks, CategoryAllowlist, CategoryRule, ClassThresholds,
    CookConversions, CookProfile, EnergyGuards, FeatureFlags, MacroPrior, MacroTolerances,
    MassChange, MassChangeKind, NegativeVocabulary, UnitToGrams, Variants,
};
pub use error::ConfigError;
pub use fingerprint::{fingerprint_documents, sha256_hex};
pub use recipes::{RecipeComponent, RecipeTemplate, RATIO_SUM_TOLERANCE};
pub use snapshot::ConfigSnapshot;

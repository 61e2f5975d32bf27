//! Input, candidate, and result types for the alignment cascade.

use serde::{Deserialize, Serialize};

use convert::ConversionSteps;
use ndb::{FoodEntry, Nutrients};

use crate::telemetry::TelemetryEvent;

/// One vision-detected food, as received from the upstream producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FoodQuery {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

impl FoodQuery {
    /// Minimal query with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            form: None,
            mass_g: None,
            confidence: None,
            modifiers: Vec::new(),
        }
    }
}

/// Which stage of the cascade produced the final decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlignmentStage {
    #[serde(rename = "stage1b")]
    Stage1b,
    #[serde(rename = "stage1c")]
    Stage1c,
    #[serde(rename = "stage1s")]
    Stage1s,
    #[serde(rename = "stage2")]
    Stage2,
    #[serde(rename = "stage5b")]
    Stage5b,
    #[serde(rename = "stage5c")]
    Stage5c,
    #[serde(rename = "stage5c_component")]
    Stage5cComponent,
    #[serde(rename = "stageZ_branded_fallback")]
    StageZBrandedFallback,
    #[serde(rename = "stageZ_energy_only")]
    StageZEnergyOnly,
    #[serde(rename = "stage0_no_candidates")]
    Stage0NoCandidates,
}

impl AlignmentStage {
    /// The wire label, identical to the serde rename.
    pub fn label(&self) -> &'static str {
        match self {
            AlignmentStage::Stage1b => "stage1b",
            AlignmentStage::Stage1c => "stage1c",
            AlignmentStage::Stage1s => "stage1s",
            AlignmentStage::Stage2 => "stage2",
            AlignmentStage::Stage5b => "stage5b",
            AlignmentStage::Stage5c => "stage5c",
            AlignmentStage::Stage5cComponent => "stage5c_component",
            AlignmentStage::StageZBrandedFallback => "stageZ_branded_fallback",
            AlignmentStage::StageZEnergyOnly => "stageZ_energy_only",
            AlignmentStage::Stage0NoCandidates => "stage0_no_candidates",
        }
    }
}

/// A scored candidate, after guardrails and before selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entry: FoodEntry,
    pub score: f64,
    /// Where the candidate came from (variant pool, semantic index, ...).
    pub provenance: &'static str,
    pub rejection_reason: Option<String>,
}

/// The final alignment decision for one food.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentResult {
    /// False for ignored inputs and stage-0 misses.
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<AlignmentStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdc_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_name: Option<String>,
    /// Mass the nutrients were computed for (cooked mass after Stage 2).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutrients_per_100g: Option<Nutrients>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_nutrients: Option<Nutrients>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<ConversionSteps>,
    /// Set for energy-only proxy decisions instead of an identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored_class: Option<String>,
    /// Child results when the food was decomposed; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expanded_foods: Vec<AlignmentResult>,
    pub telemetry: TelemetryEvent,
}

/// Run-scoped guard counters, owned per engine instance and merged at
/// end-of-batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GuardSummary {
    pub energy_guards_checked: u64,
    pub energy_guards_rejected: u64,
    pub macro_guards_checked: u64,
    pub macro_guards_rejected: u64,
    pub protein_failures: u64,
    pub carbs_failures: u64,
    pub fat_failures: u64,
    pub total_accepted: u64,
    pub stage_z_used: u64,
}

impl GuardSummary {
    /// Fold another instance's counters into this one.
    pub fn merge(&mut self, other: &GuardSummary) {
        self.energy_guards_checked += other.energy_guards_checked;
        self.energy_guards_rejected += other.energy_guards_rejected;
        self.macro_guards_checked += other.macro_guards_checked;
        self.macro_guards_rejected += other.macro_guards_rejected;
        self.protein_failures += other.protein_failures;
        self.carbs_failures += other.carbs_failures;
        self.fat_failures += other.fat_failures;
        self.total_accepted += other.total_accepted;
        self.stage_z_used += other.stage_z_used;
    }
}

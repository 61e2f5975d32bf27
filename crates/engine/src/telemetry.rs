//! The per-food telemetry event.
//!
//! One event is emitted for every food, whatever the outcome; there is no
//! hidden failure mode. The schema is additive: consumers must tolerate
//! unknown keys, and optional fields are omitted rather than serialized as
//! null so the line-delimited stream stays compact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use convert::ConversionSteps;
use normalize::{ClassIntent, FormIntent};

/// Stage 1c raw-preference switch record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage1cSwitch {
    pub from: String,
    pub to: String,
    pub from_id: i64,
    pub to_id: i64,
}

/// Stage Z resolution record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageZRecord {
    /// The canonical key that resolved.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdc_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_tag: Option<String>,
    /// `manual_verified` or `existing_config`.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kcal_bounds: Option<[f64; 2]>,
    /// Whether the pinned identifier resolved against the live NDB.
    pub present_in_ndb: bool,
}

/// One telemetry record per aligned food.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TelemetryEvent {
    pub image_id: String,
    pub food_idx: usize,
    /// The raw query name as received.
    pub query: String,
    /// Final stage label, or `ignored` for short-circuited inputs.
    pub alignment_stage: String,
    pub attempted_stages: Vec<String>,
    pub candidate_pool_size: usize,
    pub candidate_pool_foundation_count: usize,
    pub candidate_pool_legacy_count: usize,
    pub candidate_pool_branded_count: usize,
    /// Wall time spent per stage. Excluded from determinism comparisons.
    pub stage_timings_ms: BTreeMap<String, f64>,
    pub stage_rejection_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_intent: Option<ClassIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_intent: Option<FormIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_chosen: Option<String>,
    pub foundation_pool_count: usize,
    pub search_variants_tried: usize,
    pub guardrail_produce_applied: bool,
    pub guardrail_eggs_applied: bool,
    /// Candidates removed by guardrails across the whole cascade.
    pub guardrail_rejections: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdc_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdc_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_energy_per_100g: Option<f64>,
    pub conversion_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_steps: Option<ConversionSteps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage1c_switched: Option<Stage1cSwitch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_band_tolerance_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_template_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_food_count: Option<usize>,
    #[serde(rename = "stageZ_branded_fallback", skip_serializing_if = "Option::is_none")]
    pub stage_z: Option<StageZRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_confidence_note: Option<String>,
    pub code_git_sha: String,
    pub config_version: String,
    pub ndb_snapshot: String,
}

impl TelemetryEvent {
    /// Record that a stage was entered.
    pub fn attempt(&mut self, stage: &str) {
        self.attempted_stages.push(stage.to_string());
    }

    /// Record a stage-scoped rejection reason.
    pub fn reject(&mut self, stage: &str, reason: impl AsRef<str>) {
        self.stage_rejection_reasons
            .push(format!("{stage}: {}", reason.as_ref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let event = TelemetryEvent {
            image_id: "img-1".into(),
            query: "grape".into(),
            alignment_stage: "stage1b".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("stage1c_switched"));
        assert!(!json.contains("semantic_similarity"));
        assert!(json.contains("\"alignment_stage\":\"stage1b\""));
    }

    #[test]
    fn unknown_keys_are_tolerated_on_read() {
        let json = r#"{
            "image_id": "img-1", "food_idx": 0, "query": "grape",
            "alignment_stage": "stage1b", "attempted_stages": ["stage1b"],
            "candidate_pool_size": 1, "candidate_pool_foundation_count": 1,
            "candidate_pool_legacy_count": 0, "candidate_pool_branded_count": 0,
            "stage_timings_ms": {}, "stage_rejection_reasons": [],
            "foundation_pool_count": 1, "search_variants_tried": 1,
            "guardrail_produce_applied": false, "guardrail_eggs_applied": false,
            "guardrail_rejections": 0, "conversion_applied": false,
            "code_git_sha": "abc", "config_version": "configs@000000000000",
            "ndb_snapshot": "x@0", "some_future_field": 42
        }"#;
        let event: TelemetryEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.query, "grape");
    }

    #[test]
    fn rejection_reasons_carry_stage_prefix() {
        let mut event = TelemetryEvent::default();
        event.reject("stage2", "no_raw_seed");
        assert_eq!(event.stage_rejection_reasons, vec!["stage2: no_raw_seed"]);
    }
}

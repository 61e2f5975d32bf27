//! The staged food-alignment engine.
//!
//! This crate owns everything between a normalized query and a final
//! alignment decision: candidate guardrails, scoring, the Stage Z fallback
//! map, recipe decomposition execution, the cascade orchestrator, and the
//! per-food telemetry event. Construction takes a read-only NDB adapter and
//! a frozen [`configs::ConfigSnapshot`]; nothing here mutates shared state
//! beyond the engine's own [`GuardSummary`] counters.

mod decompose;
mod engine;
mod error;
mod fallback;
mod guardrails;
mod scorer;
mod telemetry;
mod types;

pub use engine::AlignmentEngine;
pub use error::AlignError;
pub use fallback::{resolve_stage_z, StageZResolution};
pub use guardrails::{apply_guardrails, GuardrailReport};
pub use scorer::{
    energy_similarity, rank_candidates, score_candidate, select_best, token_jaccard, ScoreContext,
};
pub use telemetry::{Stage1cSwitch, StageZRecord, TelemetryEvent};
pub use types::{AlignmentResult, AlignmentStage, Candidate, FoodQuery, GuardSummary};

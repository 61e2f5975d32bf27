//! The staged alignment orchestrator.
//!
//! One engine instance aligns one food at a time, walking the cascade in
//! fixed precedence: ignore short-circuits, candidate pool selection,
//! Stage 1b (raw foundation direct) with the Stage 1c raw-preference
//! post-pass, Stage 1S (semantic), Stage 2 (raw seed + cook conversion),
//! Stage 5B (rule-driven salad proxy), Stage 5C (recipe decomposition),
//! Stage Z (verified fallback), and finally Stage 0 diagnostics. Earlier
//! acceptance preempts later stages; every entered stage is appended to
//! `attempted_stages` and timed with a monotonic clock.
//!
//! All run-scoped mutation lives in the per-instance [`GuardSummary`];
//! batch runners own one engine per worker and merge the summaries at the
//! end.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use configs::{ConfigSnapshot, RecipeTemplate};
use convert::{convert, ConvertError};
use ndb::{FoodEntry, NdbAdapter, Nutrients, SourceFilter};
use normalize::{
    derive_class_intent, derive_form_intent, normalize, ClassIntent, FormIntent, NormalizedQuery,
};
use semantic::SemanticRetriever;

use crate::decompose::salad_template;
use crate::error::AlignError;
use crate::fallback::resolve_stage_z;
use crate::guardrails::apply_guardrails;
use crate::scorer::{select_best, token_jaccard, ScoreContext};
use crate::telemetry::{Stage1cSwitch, TelemetryEvent};
use crate::types::{AlignmentResult, AlignmentStage, Candidate, FoodQuery, GuardSummary};


/// Default mass assumed when a query carries none, grams.
const DEFAULT_MASS_G: f64 = 100.0;

/// Fraction of recipe components that must align for a decomposition to be
/// accepted.
const DECOMPOSITION_ACCEPT_FRACTION: f64 = 0.5;

/// The staged alignment engine.
pub struct AlignmentEngine<A: NdbAdapter> {
    ndb: A,
    configs: Arc<ConfigSnapshot>,
    semantic: Option<SemanticRetriever>,
    code_revision: String,
    ndb_snapshot: String,
    guard_summary: GuardSummary,
}

/// Outcome of candidate-pool selection across search variants.
struct PoolSelection {
    entries: Vec<FoodEntry>,
    variant: String,
    variants_tried: usize,
    foundation: usize,
    legacy: usize,
    branded: usize,
}

impl<A: NdbAdapter> AlignmentEngine<A> {
    /// Construct an engine over an adapter and a frozen config snapshot.
    ///
    /// The NDB content fingerprint is taken once here and stamped into every
    /// telemetry event this instance emits.
    pub fn new(ndb: A, configs: Arc<ConfigSnapshot>) -> Result<Self, AlignError> {
        let ndb_snapshot = ndb.content_fingerprint()?;
        if configs.feature_flags().enable_semantic_search {
            // The retriever arrives separately; until it does, Stage 1S is
            // skipped. One startup warning, then silence.
            warn!("semantic search enabled but no index attached yet; stage 1S will be skipped");
        }
        Ok(Self {
            ndb,
            configs,
            semantic: None,
            code_revision: default_code_revision(),
            ndb_snapshot,
            guard_summary: GuardSummary::default(),
        })
    }

    /// Attach a loaded semantic retriever for Stage 1S.
    pub fn with_semantic(mut self, retriever: SemanticRetriever) -> Self {
        self.semantic = Some(retriever);
        self
    }

    /// Override the code revision recorded in telemetry.
    pub fn with_code_revision(mut self, revision: impl Into<String>) -> Self {
        self.code_revision = revision.into();
        self
    }

    pub fn config_fingerprint(&self) -> &str {
        self.configs.fingerprint()
    }

    pub fn ndb_snapshot(&self) -> &str {
        &self.ndb_snapshot
    }

    /// Run-scoped guard counters so far.
    pub fn guard_summary(&self) -> GuardSummary {
        self.guard_summary
    }

    /// Align one food.
    pub fn align_food(
        &mut self,
        image_id: &str,
        food_idx: usize,
        query: &FoodQuery,
    ) -> Result<AlignmentResult, AlignError> {
        self.align_inner(image_id, food_idx, query, true)
    }

    fn align_inner(
        &mut self,
        image_id: &str,
        food_idx: usize,
        query: &FoodQuery,
        allow_decomposition: bool,
    ) -> Result<AlignmentResult, AlignError> {
        let configs = Arc::clone(&self.configs);
        let mut event = TelemetryEvent {
            image_id: image_id.to_string(),
            food_idx,
            query: query.name.clone(),
            code_git_sha: self.code_revision.clone(),
            config_version: configs.fingerprint().to_string(),
            ndb_snapshot: self.ndb_snapshot.clone(),
            ..TelemetryEvent::default()
        };

        let normalized = normalize(&query.name, query.form.as_deref())?;
        event.low_confidence_note = normalized.hints.low_confidence_note.clone();

        if let Some(class) = normalized.hints.ignored_class.clone() {
            return Ok(ignored_result(class, event));
        }
        for (needle, label) in &configs.negative_vocabulary().ignored_classes {
            if normalized.canonical_name.contains(needle.as_str()) {
                return Ok(ignored_result(label.clone(), event));
            }
        }

        let class_intent = derive_class_intent(&normalized);
        let form_intent = derive_form_intent(normalized.form.as_deref());
        event.class_intent = class_intent;
        event.form_intent = form_intent;

        // Candidate pool across search variants.
        let pool_start = Instant::now();
        let pool = self.build_pool(&normalized)?;
        record_timing(&mut event, "pool", pool_start);
        event.candidate_pool_size = pool.entries.len();
        event.candidate_pool_foundation_count = pool.foundation;
        event.candidate_pool_legacy_count = pool.legacy;
        event.candidate_pool_branded_count = pool.branded;
        event.foundation_pool_count = pool.foundation;
        event.variant_chosen = Some(pool.variant.clone());
        event.search_variants_tried = pool.variants_tried;

        let predicted_kcal = configs.energy_guards().energy_prior(&normalized.core_class);
        // A missing mass can still be recovered from a household-unit
        // modifier ("cup", "slice", ...).
        let query_mass = query.mass_g.or_else(|| {
            query
                .modifiers
                .iter()
                .find_map(|modifier| configs.unit_to_grams().grams(modifier))
        });
        let decomposition_enabled =
            configs.feature_flags().enable_recipe_decomposition && allow_decomposition;
        let mut recipe_tried = false;

        // Empty pool goes straight to decomposition before anything else.
        if pool.entries.is_empty() && decomposition_enabled {
            if let Some(template) = configs
                .recipes()
                .iter()
                .find(|t| t.matches(&normalized.canonical_name))
                .cloned()
            {
                recipe_tried = true;
                if let Some(result) = self.run_decomposition(
                    &template,
                    AlignmentStage::Stage5c,
                    image_id,
                    food_idx,
                    query_mass,
                    &mut event,
                )? {
                    return Ok(result);
                }
            }
        }

        // Guardrails run once over the whole pool: no stage may score a
        // hard-blocked candidate.
        let (guarded_pool, guard_report) = apply_guardrails(
            pool.entries.clone(),
            class_intent,
            &normalized.canonical_name,
            &normalized.core_class,
            configs.negative_vocabulary(),
            configs.category_allowlist(),
        );
        event.guardrail_produce_applied = guard_report.produce_applied;
        event.guardrail_eggs_applied = guard_report.eggs_applied;
        event.guardrail_rejections = guard_report.rejections;

        let raw_foundation: Vec<FoodEntry> = guarded_pool
            .iter()
            .filter(|entry| SourceFilter::RawFoundation.admits(entry))
            .cloned()
            .collect();

        let score_ctx = ScoreContext {
            query_tokens: &normalized.tokens,
            canonical_name: &normalized.canonical_name,
            core_class: &normalized.core_class,
            class_intent,
            form_intent,
            predicted_kcal,
            method: normalized.method.as_deref(),
            category: configs.category_allowlist().for_class(&normalized.core_class),
            stage_z: false,
        };

        // Stage 1b + 1c: raw foundation direct match for raw-or-unknown forms.
        if form_intent != Some(FormIntent::Cooked) && !raw_foundation.is_empty() {
            let stage_start = Instant::now();
            event.attempt("stage1b");
            if let Some(best) = select_best(&raw_foundation, &score_ctx) {
                let threshold = configs.class_thresholds().for_class(&normalized.core_class);
                if best.score >= threshold {
                    event.attempt("stage1c");
                    let (chosen, switch) =
                        self.raw_preference(&best, &raw_foundation, &score_ctx);
                    let stage = if switch.is_some() {
                        AlignmentStage::Stage1c
                    } else {
                        AlignmentStage::Stage1b
                    };
                    event.stage1c_switched = switch;
                    match self.macro_guard(&normalized.core_class, &chosen.nutrients) {
                        Ok(()) => {
                            record_timing(&mut event, "stage1b", stage_start);
                            return Ok(self.accept_entry(stage, &chosen, query_mass, event));
                        }
                        Err(reason) => event.reject(stage.label(), reason),
                    }
                } else {
                    event.reject(
                        "stage1b",
                        format!(
                            "best_score_{:.3}_below_threshold_{:.3}",
                            best.score, threshold
                        ),
                    );
                }
            }
            record_timing(&mut event, "stage1b", stage_start);
        }

        // Stage 1S: semantic retrieval behind its flag and a loaded index.
        if configs.feature_flags().enable_semantic_search && self.semantic.is_some() {
            let stage_start = Instant::now();
            event.attempt("stage1s");
            let flags = configs.feature_flags();
            let tolerance = configs
                .energy_guards()
                .tolerance_for_class(&normalized.core_class);
            event.energy_band_tolerance_pct = Some(tolerance * 100.0);
            let outcome = self
                .semantic
                .as_ref()
                .map(|retriever| {
                    retriever.retrieve(
                        &normalized.canonical_name,
                        predicted_kcal,
                        tolerance,
                        flags.semantic_topk,
                        flags.semantic_min_sim,
                        flags.semantic_max_cand,
                    )
                })
                .unwrap_or_else(|| unreachable!("guarded by is_some"));

            self.guard_summary.energy_guards_checked += 1;
            if outcome.rejection.as_deref() == Some("all_outside_energy_band") {
                self.guard_summary.energy_guards_rejected += 1;
            }

            match outcome.best {
                Some((row, similarity)) => {
                    event.semantic_similarity = Some(similarity);
                    match self.ndb.lookup(row.fdc_id)? {
                        Some(entry) => {
                            match self.macro_guard(&normalized.core_class, &entry.nutrients) {
                                Ok(()) => {
                                    record_timing(&mut event, "stage1s", stage_start);
                                    return Ok(self.accept_entry(
                                        AlignmentStage::Stage1s,
                                        &entry,
                                        query_mass,
                                        event,
                                    ));
                                }
                                Err(reason) => event.reject("stage1s", reason),
                            }
                        }
                        None => event.reject("stage1s", "index_row_missing_from_ndb"),
                    }
                }
                None => {
                    event.semantic_rejection_reason = outcome.rejection;
                }
            }
            record_timing(&mut event, "stage1s", stage_start);
        }

        // Stage 2: raw seed + cook conversion for cooked forms.
        if form_intent == Some(FormIntent::Cooked) {
            let stage_start = Instant::now();
            let mut seed: Option<FoodEntry> = None;
            if !raw_foundation.is_empty() {
                // Seed refinement reuses the 1b/1c machinery: score the raw
                // foundation partition and prefer unprocessed seeds.
                event.attempt("stage1c");
                if let Some(best) = select_best(&raw_foundation, &score_ctx) {
                    let threshold =
                        configs.class_thresholds().for_class(&normalized.core_class);
                    if best.score >= threshold {
                        let (chosen, switch) =
                            self.raw_preference(&best, &raw_foundation, &score_ctx);
                        event.stage1c_switched = switch;
                        seed = Some(chosen);
                    } else {
                        event.reject(
                            "stage1c",
                            format!("seed_score_{:.3}_below_threshold", best.score),
                        );
                    }
                }
            }

            event.attempt("stage2");
            match seed {
                None => event.reject("stage2", "no_raw_seed"),
                Some(seed) => {
                    if configs.feature_flags().strict_cooked_exact_gate
                        && !exact_name_gate(&normalized, &seed)
                    {
                        event.reject("stage2", "strict_cooked_exact_gate");
                    } else {
                        let method = normalized
                            .method
                            .clone()
                            .unwrap_or_else(|| configs.cook_conversions().fallback_method.clone());
                        let raw_mass = query_mass.unwrap_or(DEFAULT_MASS_G);
                        match convert(
                            &seed,
                            &normalized.core_class,
                            &method,
                            raw_mass,
                            configs.cook_conversions(),
                        ) {
                            Ok(outcome) => {
                                match self
                                    .macro_guard(&normalized.core_class, &outcome.entry.nutrients)
                                {
                                    Ok(()) => {
                                        record_timing(&mut event, "stage2", stage_start);
                                        event.conversion_applied = true;
                                        event.conversion_steps = Some(outcome.steps.clone());
                                        let mut result = self.accept_entry(
                                            AlignmentStage::Stage2,
                                            &outcome.entry,
                                            Some(outcome.mass_g),
                                            event,
                                        );
                                        result.conversion = Some(outcome.steps);
                                        return Ok(result);
                                    }
                                    Err(reason) => event.reject("stage2", reason),
                                }
                            }
                            Err(ConvertError::SeedGuardrail { reason }) => {
                                event.reject("stage2", format!("stage2_seed_guardrail: {reason}"));
                            }
                            Err(ConvertError::Unsupported { .. }) => {
                                event.reject("stage2", "conversion_unsupported");
                            }
                            Err(ConvertError::NonPositiveMass(mass)) => {
                                event.reject("stage2", format!("non_positive_mass_{mass}"));
                            }
                        }
                    }
                }
            }
            record_timing(&mut event, "stage2", stage_start);
        }

        // Stage 5B: rule-driven salad proxy.
        if decomposition_enabled {
            if let Some(template) = salad_template(&normalized.canonical_name) {
                if let Some(result) = self.run_decomposition(
                    &template,
                    AlignmentStage::Stage5b,
                    image_id,
                    food_idx,
                    query_mass,
                    &mut event,
                )? {
                    return Ok(result);
                }
            }
        }

        // Stage 5C: configured recipe decomposition.
        if decomposition_enabled && !recipe_tried {
            if let Some(template) = configs
                .recipes()
                .iter()
                .find(|t| t.matches(&normalized.canonical_name))
                .cloned()
            {
                if let Some(result) = self.run_decomposition(
                    &template,
                    AlignmentStage::Stage5c,
                    image_id,
                    food_idx,
                    query_mass,
                    &mut event,
                )? {
                    return Ok(result);
                }
            }
        }

        // Stage Z: verified fallback, gated on pool state and flags.
        let crucifer_cooked = class_intent == Some(ClassIntent::LeafyOrCrucifer)
            && form_intent == Some(FormIntent::Cooked);
        let stage_z_allowed = pool.entries.is_empty()
            || guarded_pool.is_empty()
            || configs.feature_flags().allow_stage_z_for_partial_pools
            || crucifer_cooked;
        if stage_z_allowed {
            let stage_start = Instant::now();
            event.attempt("stageZ_branded_fallback");
            if let Some(resolution) =
                resolve_stage_z(&normalized, class_intent, &self.ndb, &configs)?
            {
                if let Some(bounds) = resolution.record.kcal_bounds {
                    self.guard_summary.energy_guards_checked += 1;
                    debug_assert!(
                        resolution.kcal_per_100g >= bounds[0]
                            && resolution.kcal_per_100g <= bounds[1]
                    );
                }
                let macro_ok = match &resolution.entry {
                    Some(entry) => self
                        .macro_guard(&normalized.core_class, &entry.nutrients)
                        .map_err(|reason| event.reject("stageZ_branded_fallback", reason))
                        .is_ok(),
                    None => true,
                };
                if macro_ok {
                    record_timing(&mut event, "stageZ", stage_start);
                    event.stage_z = Some(resolution.record.clone());
                    self.guard_summary.stage_z_used += 1;
                    self.guard_summary.total_accepted += 1;
                    event.alignment_stage = resolution.stage.label().to_string();
                    event.fdc_id = resolution.record.fdc_id;
                    event.fdc_name = resolution.entry.as_ref().map(|e| e.name.clone());
                    event.matched_energy_per_100g = Some(resolution.kcal_per_100g);
                    let mass_g = query_mass;
                    let total = mass_g.map(|m| resolution.nutrients.scaled_to_mass(m));
                    return Ok(AlignmentResult {
                        available: true,
                        stage: Some(resolution.stage),
                        fdc_id: resolution.record.fdc_id,
                        matched_name: resolution.entry.as_ref().map(|e| e.name.clone()),
                        mass_g,
                        nutrients_per_100g: Some(resolution.nutrients.clone()),
                        total_nutrients: total,
                        conversion: None,
                        proxy_tag: resolution.record.proxy_tag.clone(),
                        ignored_class: None,
                        expanded_foods: Vec::new(),
                        telemetry: event,
                    });
                }
            } else {
                event.reject("stageZ_branded_fallback", "no_fallback_entry");
            }
            record_timing(&mut event, "stageZ", stage_start);
        }

        // Stage 0: structured miss.
        event.attempt("stage0_no_candidates");
        let why = if pool.entries.is_empty() {
            "empty_pool"
        } else {
            "all_rejected"
        };
        event.reject("stage0", why);
        event.alignment_stage = AlignmentStage::Stage0NoCandidates.label().to_string();
        debug_assert!(
            !event.attempted_stages.is_empty(),
            "attempted_stages must never be empty past the ignore sentinel"
        );
        debug!(query = %query.name, why, "alignment miss");
        Ok(AlignmentResult {
            available: false,
            stage: Some(AlignmentStage::Stage0NoCandidates),
            fdc_id: None,
            matched_name: None,
            mass_g: query_mass,
            nutrients_per_100g: None,
            total_nutrients: None,
            conversion: None,
            proxy_tag: None,
            ignored_class: None,
            expanded_foods: Vec::new(),
            telemetry: event,
        })
    }

    /// Search the canonical name and every configured variant, keeping the
    /// pool whose `(foundation_count, total_count, raw_bias)` is best.
    fn build_pool(&self, normalized: &NormalizedQuery) -> Result<PoolSelection, AlignError> {
        let mut variants = vec![normalized.canonical_name.clone()];
        for variant in self.configs.variants().for_class(&normalized.core_class) {
            if !variants.contains(variant) {
                variants.push(variant.clone());
            }
        }

        let mut best: Option<((usize, usize, usize), PoolSelection)> = None;
        for variant in &variants {
            let entries = self.ndb.search(variant, SourceFilter::Any)?;
            let foundation = entries
                .iter()
                .filter(|e| SourceFilter::Foundation.admits(e))
                .count();
            let legacy = entries
                .iter()
                .filter(|e| SourceFilter::Legacy.admits(e))
                .count();
            let branded = entries
                .iter()
                .filter(|e| SourceFilter::Branded.admits(e))
                .count();
            let raw_bias = entries
                .iter()
                .filter(|e| SourceFilter::RawFoundation.admits(e))
                .count();
            let key = (foundation, entries.len(), raw_bias);
            let selection = PoolSelection {
                entries,
                variant: variant.clone(),
                variants_tried: variants.len(),
                foundation,
                legacy,
                branded,
            };
            // Strict greater-than keeps the earliest variant on ties, which
            // keeps selection deterministic.
            if best.as_ref().map_or(true, |(best_key, _)| key > *best_key) {
                best = Some((key, selection));
            }
        }
        Ok(best
            .map(|(_, selection)| selection)
            .unwrap_or(PoolSelection {
                entries: Vec::new(),
                variant: normalized.canonical_name.clone(),
                variants_tried: variants.len(),
                foundation: 0,
                legacy: 0,
                branded: 0,
            }))
    }

    /// Stage 1c raw-preference pass. Given the picked candidate and its
    /// candidate set, switch to a raw alternative when the pick looks
    /// processed. Infallible by contract: any failure keeps the original.
    fn raw_preference(
        &self,
        picked: &Candidate,
        pool: &[FoodEntry],
        ctx: &ScoreContext<'_>,
    ) -> (FoodEntry, Option<Stage1cSwitch>) {
        let vocabulary = self.configs.negative_vocabulary();
        let picked_name = picked.entry.name_lower();
        let is_processed = |name: &str| {
            vocabulary
                .stage1c_processed_penalties
                .iter()
                .any(|term| name.contains(term.as_str()))
        };
        let is_raw = |name: &str| {
            vocabulary
                .stage1c_raw_synonyms
                .iter()
                .any(|term| name.contains(term.as_str()))
        };

        if !is_processed(&picked_name) {
            return (picked.entry.clone(), None);
        }

        let alternatives: Vec<FoodEntry> = pool
            .iter()
            .filter(|entry| {
                let name = entry.name_lower();
                entry.fdc_id != picked.entry.fdc_id && is_raw(&name) && !is_processed(&name)
            })
            .cloned()
            .collect();

        match select_best(&alternatives, ctx) {
            Some(alternative) => {
                let switch = Stage1cSwitch {
                    from: picked.entry.name.clone(),
                    to: alternative.entry.name.clone(),
                    from_id: picked.entry.fdc_id,
                    to_id: alternative.entry.fdc_id,
                };
                (alternative.entry, Some(switch))
            }
            None => (picked.entry.clone(), None),
        }
    }

    /// Execute one decomposition template; `None` means aborted.
    fn run_decomposition(
        &mut self,
        template: &RecipeTemplate,
        stage: AlignmentStage,
        image_id: &str,
        food_idx: usize,
        query_mass: Option<f64>,
        event: &mut TelemetryEvent,
    ) -> Result<Option<AlignmentResult>, AlignError> {
        let stage_start = Instant::now();
        event.attempt(stage.label());
        let total_mass = query_mass.unwrap_or(DEFAULT_MASS_G);

        let mut children = Vec::with_capacity(template.components.len());
        let mut aligned = 0usize;
        for component in &template.components {
            let component_mass = total_mass * component.ratio;
            let child = self.align_component(component, component_mass, image_id, food_idx)?;
            if child.available {
                aligned += 1;
            }
            children.push(child);
        }

        let fraction = aligned as f64 / template.components.len() as f64;
        if fraction < DECOMPOSITION_ACCEPT_FRACTION {
            event.reject(
                stage.label(),
                format!("decomposition_aborted_fraction_{fraction:.2}"),
            );
            record_timing(event, stage.label(), stage_start);
            return Ok(None);
        }

        // Parent nutrients are the mass-weighted sum of the aligned children.
        let mut total = Nutrients::default();
        for child in children.iter().filter(|c| c.available) {
            if let Some(child_total) = &child.total_nutrients {
                total.energy_kcal += child_total.energy_kcal;
                total.protein_g += child_total.protein_g;
                total.carbs_g += child_total.carbs_g;
                total.fat_g += child_total.fat_g;
            }
        }
        let per_100g = total.scaled_to_mass(100.0 * 100.0 / total_mass.max(1e-9));

        record_timing(event, stage.label(), stage_start);
        event.recipe_template = Some(template.name.clone());
        if !template.sha256.is_empty() {
            event.recipe_template_sha256 = Some(template.sha256.clone());
        }
        event.expanded_food_count = Some(children.len());
        self.guard_summary.total_accepted += 1;

        let mut event = std::mem::take(event);
        event.alignment_stage = stage.label().to_string();
        Ok(Some(AlignmentResult {
            available: true,
            stage: Some(stage),
            fdc_id: None,
            matched_name: Some(template.name.clone()),
            mass_g: Some(total_mass),
            nutrients_per_100g: Some(per_100g),
            total_nutrients: Some(total),
            conversion: None,
            proxy_tag: None,
            ignored_class: None,
            expanded_foods: children,
            telemetry: event,
        }))
    }

    /// Align one recipe component: pinned identifiers, then prefer keys,
    /// then a recursive (non-decomposing) engine run.
    fn align_component(
        &mut self,
        component: &configs::RecipeComponent,
        component_mass: f64,
        image_id: &str,
        food_idx: usize,
    ) -> Result<AlignmentResult, AlignError> {
        // 1. Pinned identifiers, in order, gated on the energy window.
        for fdc_id in &component.fdc_ids {
            let Some(entry) = self.ndb.lookup(*fdc_id)? else {
                continue;
            };
            if let Some([lo, hi]) = component.kcal_per_100g {
                let kcal = entry.nutrients.energy_kcal;
                if kcal < lo || kcal > hi {
                    continue;
                }
            }
            let name = entry.name_lower();
            if component
                .reject_patterns
                .iter()
                .any(|p| name.contains(p.as_str()))
            {
                continue;
            }
            return Ok(self.component_result(
                AlignmentStage::Stage5cComponent,
                &entry,
                component,
                component_mass,
                image_id,
                food_idx,
            ));
        }

        // 2. Prefer keys against the verified Stage Z map.
        for key in &component.prefer {
            let Some(fallback) = self.configs.branded_fallbacks().get(key).cloned() else {
                continue;
            };
            if !fallback.db_verified {
                continue;
            }
            let Some(entry) = self.ndb.lookup(fallback.fdc_id)? else {
                continue;
            };
            let kcal = entry.nutrients.energy_kcal;
            if kcal < fallback.kcal_bounds[0] || kcal > fallback.kcal_bounds[1] {
                continue;
            }
            return Ok(self.component_result(
                AlignmentStage::StageZBrandedFallback,
                &entry,
                component,
                component_mass,
                image_id,
                food_idx,
            ));
        }

        // 3. Recursive alignment; the nested run must not decompose again.
        let synthetic = FoodQuery {
            name: component.key.replace('_', " "),
            form: None,
            mass_g: Some(component_mass),
            confidence: None,
            modifiers: Vec::new(),
        };
        self.align_inner(image_id, food_idx, &synthetic, false)
    }

    fn component_result(
        &mut self,
        stage: AlignmentStage,
        entry: &FoodEntry,
        component: &configs::RecipeComponent,
        component_mass: f64,
        image_id: &str,
        food_idx: usize,
    ) -> AlignmentResult {
        let mut event = TelemetryEvent {
            image_id: image_id.to_string(),
            food_idx,
            query: component.key.clone(),
            alignment_stage: stage.label().to_string(),
            code_git_sha: self.code_revision.clone(),
            config_version: self.configs.fingerprint().to_string(),
            ndb_snapshot: self.ndb_snapshot.clone(),
            ..TelemetryEvent::default()
        };
        event.attempt(stage.label());
        event.fdc_id = Some(entry.fdc_id);
        event.fdc_name = Some(entry.name.clone());
        event.matched_energy_per_100g = Some(entry.nutrients.energy_kcal);
        self.guard_summary.total_accepted += 1;

        AlignmentResult {
            available: true,
            stage: Some(stage),
            fdc_id: Some(entry.fdc_id),
            matched_name: Some(entry.name.clone()),
            mass_g: Some(component_mass),
            nutrients_per_100g: Some(entry.nutrients.clone()),
            total_nutrients: Some(entry.nutrients.scaled_to_mass(component_mass)),
            conversion: None,
            proxy_tag: None,
            ignored_class: None,
            expanded_foods: Vec::new(),
            telemetry: event,
        }
    }

    /// Macro plausibility guard against the class prior, when one exists.
    fn macro_guard(&mut self, core_class: &str, candidate: &Nutrients) -> Result<(), String> {
        self.guard_summary.macro_guards_checked += 1;
        let guards = self.configs.energy_guards();
        let Some(prior) = guards.macro_prior(core_class) else {
            return Ok(());
        };
        let tolerances = guards.macro_tolerances.clone();

        let mut failures = Vec::new();
        let protein_tol = (tolerances.protein_factor * prior.protein_g).min(tolerances.protein_floor_g);
        if (candidate.protein_g - prior.protein_g).abs() > protein_tol {
            failures.push("protein");
            self.guard_summary.protein_failures += 1;
        }
        let carbs_tol = (tolerances.carbs_factor * prior.carbs_g).min(tolerances.carbs_floor_g);
        if (candidate.carbs_g - prior.carbs_g).abs() > carbs_tol {
            failures.push("carbs");
            self.guard_summary.carbs_failures += 1;
        }
        let fat_tol = (tolerances.fat_factor * prior.fat_g).min(tolerances.fat_floor_g);
        if (candidate.fat_g - prior.fat_g).abs() > fat_tol {
            failures.push("fat");
            self.guard_summary.fat_failures += 1;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            self.guard_summary.macro_guards_rejected += 1;
            Err(format!("macro_guard_failure: {}", failures.join(",")))
        }
    }

    /// Build the accepted result for a directly matched entry.
    fn accept_entry(
        &mut self,
        stage: AlignmentStage,
        entry: &FoodEntry,
        mass_g: Option<f64>,
        mut event: TelemetryEvent,
    ) -> AlignmentResult {
        self.guard_summary.total_accepted += 1;
        event.alignment_stage = stage.label().to_string();
        event.fdc_id = Some(entry.fdc_id);
        event.fdc_name = Some(entry.name.clone());
        event.matched_energy_per_100g = Some(entry.nutrients.energy_kcal);

        let total = mass_g.map(|m| entry.nutrients.scaled_to_mass(m));
        AlignmentResult {
            available: true,
            stage: Some(stage),
            fdc_id: Some(entry.fdc_id),
            matched_name: Some(entry.name.clone()),
            mass_g,
            nutrients_per_100g: Some(entry.nutrients.clone()),
            total_nutrients: total,
            conversion: None,
            proxy_tag: None,
            ignored_class: None,
            expanded_foods: Vec::new(),
            telemetry: event,
        }
    }
}

/// Whether the seed's tokens (minus form words) exactly cover the query's.
fn exact_name_gate(normalized: &NormalizedQuery, seed: &FoodEntry) -> bool {
    let seed_tokens: Vec<String> = normalize::tokenize(&seed.name)
        .into_iter()
        .filter(|t| t != "raw" && t != "fresh" && t != "cooked" && t != "uncooked")
        .collect();
    (token_jaccard(&normalized.tokens, &seed_tokens) - 1.0).abs() < f64::EPSILON
}

fn ignored_result(class: String, mut event: TelemetryEvent) -> AlignmentResult {
    event.alignment_stage = "ignored".to_string();
    event.ignored_class = Some(class.clone());
    AlignmentResult {
        available: false,
        stage: None,
        fdc_id: None,
        matched_name: None,
        mass_g: None,
        nutrients_per_100g: None,
        total_nutrients: None,
        conversion: None,
        proxy_tag: None,
        ignored_class: Some(class),
        expanded_foods: Vec::new(),
        telemetry: event,
    }
}

fn record_timing(event: &mut TelemetryEvent, stage: &str, start: Instant) {
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    event
        .stage_timings_ms
        .entry(stage.to_string())
        .and_modify(|existing| *existing += ms)
        .or_insert(ms);
}

fn default_code_revision() -> String {
    option_env!("FOODALIGN_GIT_SHA")
        .unwrap_or(env!("CARGO_PKG_VERSION"))
        .to_string()
}

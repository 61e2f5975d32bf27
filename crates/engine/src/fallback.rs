//! Stage Z: the verified keyed fallback map.
//!
//! When every preferable stage has failed, the engine consults a curated map
//! from canonical class key to a pinned database identifier with energy
//! bounds. Resolution is conservative: a synonym must connect the query to
//! the key, a verified entry must actually resolve in the live NDB, its
//! energy must sit inside the pinned bounds, and reject patterns are a final
//! veto. Unverified entries participate only behind an explicit flag and are
//! logged loudly.
//!
//! A query can match several fallback keys (`brussels_sprouts_roasted` and
//! `brussels_sprouts`, say). When more than one key verifies, the resolver
//! ranks the resolved entries through the scorer with its Stage Z damping
//! active, so curation-level pins are compared on lexical and energy
//! agreement without large class nudges overriding the curation.
//!
//! A secondary energy-only mode proxies classes with no keyed entry from
//! their class-level energy density. Produce, leafy and nut classes are
//! never proxied; a wrong produce proxy is worse than an honest miss.

use tracing::{debug, warn};

use configs::ConfigSnapshot;
use ndb::{FoodEntry, NdbAdapter, Nutrients};
use normalize::{derive_form_intent, ClassIntent, NormalizedQuery};

use crate::error::AlignError;
use crate::scorer::{score_candidate, ScoreContext};
use crate::telemetry::StageZRecord;
use crate::types::AlignmentStage;

/// A successful Stage Z resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct StageZResolution {
    pub stage: AlignmentStage,
    pub record: StageZRecord,
    /// Resolved NDB entry for branded fallbacks; `None` for energy-only.
    pub entry: Option<FoodEntry>,
    /// Energy density the decision is based on.
    pub kcal_per_100g: f64,
    /// Proxy nutrient profile for energy-only decisions.
    pub nutrients: Nutrients,
}

/// Try to resolve the query through the fallback map, then through the
/// energy-only proxy.
///
/// Every key candidate is verified independently; with several survivors
/// the scored best wins, ties breaking on key specificity (candidate
/// order). Bounds-midpoint proxies for unverified, unresolvable pins carry
/// no entry to score and are only used when nothing scored survives.
pub fn resolve_stage_z<A: NdbAdapter>(
    query: &NormalizedQuery,
    class_intent: Option<ClassIntent>,
    ndb: &A,
    configs: &ConfigSnapshot,
) -> Result<Option<StageZResolution>, AlignError> {
    let fallbacks = configs.branded_fallbacks();
    let allow_unverified = configs.feature_flags().allow_unverified_branded;

    let mut scored: Vec<StageZResolution> = Vec::new();
    let mut midpoint_proxy: Option<StageZResolution> = None;

    for key in query.fallback_key_candidates() {
        let Some(fallback) = fallbacks.get(&key) else {
            continue;
        };

        // Synonym gate: an empty synonym list means the key itself is the
        // only required connection.
        let synonym_ok = fallback.synonyms.is_empty()
            || fallback
                .synonyms
                .iter()
                .any(|s| query.canonical_name.contains(s.as_str()) || s.as_str() == key);
        if !synonym_ok {
            continue;
        }

        if !fallback.db_verified && !allow_unverified {
            continue;
        }

        let resolved = ndb.lookup(fallback.fdc_id)?;
        let present_in_ndb = resolved.is_some();

        if fallback.db_verified && !present_in_ndb {
            // A verified pin that no longer resolves is configuration drift;
            // skip it rather than trusting stale bounds.
            warn!(key = %key, fdc_id = fallback.fdc_id, "verified stage Z identifier missing from NDB");
            continue;
        }

        if let Some(entry) = resolved {
            let kcal = entry.nutrients.energy_kcal;
            if kcal < fallback.kcal_bounds[0] || kcal > fallback.kcal_bounds[1] {
                continue;
            }
            let name = entry.name_lower();
            if fallback
                .reject_patterns
                .iter()
                .any(|p| name.contains(p.as_str()))
            {
                continue;
            }
            if !fallback.db_verified {
                warn!(key = %key, fdc_id = fallback.fdc_id, "using unverified branded fallback");
            }
            let source = if fallback.db_verified {
                "manual_verified"
            } else {
                "existing_config"
            };
            let nutrients = entry.nutrients.clone();
            scored.push(StageZResolution {
                stage: AlignmentStage::StageZBrandedFallback,
                record: StageZRecord {
                    key,
                    fdc_id: Some(entry.fdc_id),
                    proxy_tag: None,
                    source: source.to_string(),
                    kcal_bounds: Some(fallback.kcal_bounds),
                    present_in_ndb,
                },
                entry: Some(entry),
                kcal_per_100g: nutrients.energy_kcal,
                nutrients,
            });
            continue;
        }

        // Unverified and unresolvable: remember the bounds midpoint as an
        // energy-only proxy carrying the key, used only when no resolved
        // entry survives.
        if midpoint_proxy.is_none() {
            warn!(key = %key, fdc_id = fallback.fdc_id, "unverified stage Z identifier missing from NDB, proxying bounds midpoint");
            let midpoint = (fallback.kcal_bounds[0] + fallback.kcal_bounds[1]) / 2.0;
            midpoint_proxy = Some(StageZResolution {
                stage: AlignmentStage::StageZBrandedFallback,
                record: StageZRecord {
                    key: key.clone(),
                    fdc_id: None,
                    proxy_tag: Some(format!("unverified_branded:{key}")),
                    source: "existing_config".to_string(),
                    kcal_bounds: Some(fallback.kcal_bounds),
                    present_in_ndb: false,
                },
                entry: None,
                kcal_per_100g: midpoint,
                nutrients: Nutrients {
                    energy_kcal: midpoint,
                    ..Nutrients::default()
                },
            });
        }
    }

    if let Some(winner) = select_scored(query, class_intent, configs, scored) {
        return Ok(Some(winner));
    }
    if midpoint_proxy.is_some() {
        return Ok(midpoint_proxy);
    }
    Ok(resolve_energy_only(query, class_intent, configs))
}

/// Pick the best of several verified resolutions by scoring their entries
/// with the Stage Z damping active. A single survivor skips scoring; ties
/// keep the more specific key (earlier candidate order).
fn select_scored(
    query: &NormalizedQuery,
    class_intent: Option<ClassIntent>,
    configs: &ConfigSnapshot,
    mut scored: Vec<StageZResolution>,
) -> Option<StageZResolution> {
    if scored.len() <= 1 {
        return scored.pop();
    }

    let score_ctx = ScoreContext {
        query_tokens: &query.tokens,
        canonical_name: &query.canonical_name,
        core_class: &query.core_class,
        class_intent,
        form_intent: derive_form_intent(query.form.as_deref()),
        predicted_kcal: configs.energy_guards().energy_prior(&query.core_class),
        method: query.method.as_deref(),
        category: configs.category_allowlist().for_class(&query.core_class),
        stage_z: true,
    };

    let mut best_idx = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (idx, resolution) in scored.iter().enumerate() {
        let score = match &resolution.entry {
            Some(entry) => score_candidate(entry, &score_ctx),
            None => f64::NEG_INFINITY,
        };
        debug!(key = %resolution.record.key, score, "stage Z candidate scored");
        // Strict greater-than keeps the earlier (more specific) key on ties.
        if score > best_score {
            best_score = score;
            best_idx = idx;
        }
    }
    Some(scored.swap_remove(best_idx))
}

/// Energy-only proxy: class-level energy density with no identifier.
fn resolve_energy_only(
    query: &NormalizedQuery,
    class_intent: Option<ClassIntent>,
    configs: &ConfigSnapshot,
) -> Option<StageZResolution> {
    let guards = configs.energy_guards();

    let intent_label = match class_intent {
        Some(ClassIntent::Produce) => Some("produce"),
        Some(ClassIntent::LeafyOrCrucifer) => Some("leafy_or_crucifer"),
        _ => None,
    };
    if guards.never_proxy(&query.core_class) {
        return None;
    }
    if let Some(label) = intent_label {
        if guards.never_proxy(label) {
            return None;
        }
    }

    let kcal = guards.energy_prior(&query.core_class)?;
    let proxy_tag = format!("energy_only:{}", query.core_class);
    Some(StageZResolution {
        stage: AlignmentStage::StageZEnergyOnly,
        record: StageZRecord {
            key: query.core_class.clone(),
            fdc_id: None,
            proxy_tag: Some(proxy_tag),
            source: "existing_config".to_string(),
            kcal_bounds: None,
            present_in_ndb: false,
        },
        entry: None,
        kcal_per_100g: kcal,
        nutrients: Nutrients {
            energy_kcal: kcal,
            ..Nutrients::default()
        },
    })
}

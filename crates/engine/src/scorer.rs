//! Candidate ranking.
//!
//! The base score combines lexical overlap with energy agreement:
//! `0.7 * jaccard + 0.3 * energy_similarity`. Class-conditional nudges are
//! added on top, and selection applies a deterministic tie-break for scores
//! within 0.02 of the best: foundation beats legacy beats branded, then the
//! smaller energy delta, then the shorter name, then the lower identifier.

use configs::CategoryRule;
use ndb::{FoodEntry, FormTag, SourceTag};
use normalize::{tokenize, ClassIntent, FormIntent};

use crate::types::Candidate;

/// Everything the scorer needs to know about the query.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext<'a> {
    pub query_tokens: &'a [String],
    pub canonical_name: &'a str,
    pub core_class: &'a str,
    pub class_intent: Option<ClassIntent>,
    pub form_intent: Option<FormIntent>,
    /// Predicted kcal/100 g from the class prior, when one exists.
    pub predicted_kcal: Option<f64>,
    pub method: Option<&'a str>,
    /// Category allow/penalize lists for the core class, when configured.
    pub category: Option<&'a CategoryRule>,
    /// Stage Z entries get their nudges halved past ±0.06.
    pub stage_z: bool,
}

const DESSERT_TERMS: &[&str] = &[
    "croissant",
    "ice cream",
    "cake",
    "cookie",
    "pastry",
    "muffin",
    "pie",
    "cracker",
    "pancake",
    "bread",
    "toast",
    "waffle",
];

const SCRAMBLED_POSITIVE: &[&str] = &["scrambled", "omelet", "whole cooked", "whole, cooked"];
const EGG_NEGATIVE: &[&str] = &["yolk", "white", "pasteurized", "mixture", "frozen"];
const EGG_GENERIC_POSITIVE: &[&str] = &["whole", "cooked"];
const OLIVE_POSITIVE: &[&str] = &["ripe", "whole", "table", "black"];
const OLIVE_NEGATIVE: &[&str] = &["oil", "stuffed", "brined", "cured", "pimiento"];
const STARCHY_CLASSES: &[&str] = &["potato", "sweet_potato", "corn", "squash", "pumpkin"];
const METHOD_WORDS: &[&str] = &[
    "roasted", "grilled", "baked", "fried", "steamed", "boiled", "poached", "scrambled",
    "pan seared",
];

/// Set-similarity over token lists: |A ∩ B| / |A ∪ B|.
pub fn token_jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.iter().filter(|t| b.contains(t)).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// `1 - min(1, |Δ| / predicted)`, or 1.0 with no prediction.
pub fn energy_similarity(predicted: Option<f64>, candidate_kcal: f64) -> f64 {
    match predicted {
        Some(predicted) if predicted > 0.0 => {
            1.0 - ((candidate_kcal - predicted).abs() / predicted).min(1.0)
        }
        _ => 1.0,
    }
}

/// Score one candidate: base score plus class-conditional nudges.
pub fn score_candidate(entry: &FoodEntry, ctx: &ScoreContext<'_>) -> f64 {
    let candidate_tokens = tokenize(&entry.name);
    let base = 0.7 * token_jaccard(ctx.query_tokens, &candidate_tokens)
        + 0.3 * energy_similarity(ctx.predicted_kcal, entry.nutrients.energy_kcal);

    let name = entry.name_lower();
    let mut total = base;
    let mut nudge = |amount: f64| {
        // Stage Z entries are pinned by hand; big lexical nudges would
        // second-guess the curation, so they are damped.
        let applied = if ctx.stage_z && amount.abs() > 0.06 {
            amount / 2.0
        } else {
            amount
        };
        total += applied;
    };

    match ctx.class_intent {
        Some(ClassIntent::EggsScrambled) => {
            if SCRAMBLED_POSITIVE.iter().any(|t| name.contains(t)) {
                nudge(0.25);
            }
            if contains_unexcepted(&name, ctx.canonical_name, EGG_NEGATIVE) {
                nudge(-0.25);
            }
        }
        Some(ClassIntent::Eggs) => {
            if EGG_GENERIC_POSITIVE.iter().any(|t| name.contains(t)) {
                nudge(0.15);
            }
            if contains_unexcepted(&name, ctx.canonical_name, EGG_NEGATIVE) {
                nudge(-0.15);
            }
        }
        _ => {}
    }

    match (ctx.form_intent, entry.form) {
        (Some(FormIntent::Raw), FormTag::Raw) | (Some(FormIntent::Cooked), FormTag::Cooked) => {
            nudge(0.08)
        }
        (Some(FormIntent::Raw), FormTag::Cooked) | (Some(FormIntent::Cooked), FormTag::Raw) => {
            nudge(-0.08)
        }
        _ => {}
    }

    if matches!(
        ctx.class_intent,
        Some(ClassIntent::Produce) | Some(ClassIntent::LeafyOrCrucifer)
    ) && contains_unexcepted(&name, ctx.canonical_name, DESSERT_TERMS)
    {
        nudge(-0.35);
    }

    if ctx.class_intent == Some(ClassIntent::Produce)
        && ctx.form_intent == Some(FormIntent::Cooked)
        && STARCHY_CLASSES.contains(&ctx.core_class)
        && entry.form == FormTag::Cooked
    {
        nudge(0.03);
    }

    if ctx.core_class == "olive" {
        if OLIVE_POSITIVE.iter().any(|t| name.contains(t)) {
            nudge(0.15);
        }
        if OLIVE_NEGATIVE.iter().any(|t| name.contains(t)) {
            nudge(-0.25);
        }
    }

    if let Some(rule) = ctx.category {
        if rule.allow_contains.iter().any(|t| name.contains(t.as_str())) {
            nudge(0.05);
        }
        if rule
            .penalize_contains
            .iter()
            .any(|t| name.contains(t.as_str()) && !ctx.canonical_name.contains(t.as_str()))
        {
            nudge(-0.10);
        }
    }

    if let Some(method) = ctx.method {
        let spoken = method.replace('_', " ");
        if name.contains(&spoken) {
            nudge(0.05);
        } else if METHOD_WORDS
            .iter()
            .any(|word| *word != spoken && name.contains(word))
        {
            nudge(-0.10);
        }
    }

    total
}

/// Score a pool and return candidates ordered best-first with the
/// deterministic tie-break applied among near-ties.
pub fn rank_candidates(pool: &[FoodEntry], ctx: &ScoreContext<'_>) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = pool
        .iter()
        .map(|entry| Candidate {
            entry: entry.clone(),
            score: score_candidate(entry, ctx),
            provenance: "keyword_pool",
            rejection_reason: None,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| tie_break_key(a, ctx).cmp(&tie_break_key(b, ctx)))
    });

    // Near-ties (within 0.02 of the best) re-order purely by the
    // deterministic tie-break key.
    if let Some(best_score) = candidates.first().map(|c| c.score) {
        let tied = candidates
            .iter()
            .take_while(|c| best_score - c.score <= 0.02)
            .count();
        candidates[..tied].sort_by_key(|c| tie_break_key(c, ctx));
    }

    candidates
}

/// Best candidate of a pool, if any.
pub fn select_best(pool: &[FoodEntry], ctx: &ScoreContext<'_>) -> Option<Candidate> {
    rank_candidates(pool, ctx).into_iter().next()
}

type TieKey = (u8, u64, usize, i64);

fn tie_break_key(candidate: &Candidate, ctx: &ScoreContext<'_>) -> TieKey {
    let source_rank = match candidate.entry.source {
        SourceTag::Foundation => 0u8,
        SourceTag::Legacy => 1,
        SourceTag::Branded => 2,
    };
    let energy_delta = ctx
        .predicted_kcal
        .map(|p| (candidate.entry.nutrients.energy_kcal - p).abs())
        .unwrap_or(0.0);
    // f64 deltas are non-negative here; the bit pattern preserves order.
    (
        source_rank,
        energy_delta.to_bits(),
        candidate.entry.name.len(),
        candidate.entry.fdc_id,
    )
}

fn contains_unexcepted(name: &str, canonical_name: &str, terms: &[&str]) -> bool {
    terms
        .iter()
        .any(|term| name.contains(term) && !canonical_name.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndb::Nutrients;

    fn entry(fdc_id: i64, name: &str, source: SourceTag, form: FormTag, kcal: f64) -> FoodEntry {
        FoodEntry {
            fdc_id,
            name: name.to_string(),
            source,
            form,
            nutrients: Nutrients {
                energy_kcal: kcal,
                protein_g: 1.0,
                carbs_g: 10.0,
                fat_g: 0.5,
                micros: None,
            },
        }
    }

    fn ctx<'a>(tokens: &'a [String], name: &'a str, class: &'a str) -> ScoreContext<'a> {
        ScoreContext {
            query_tokens: tokens,
            canonical_name: name,
            core_class: class,
            class_intent: None,
            form_intent: None,
            predicted_kcal: None,
            method: None,
            category: None,
            stage_z: false,
        }
    }

    #[test]
    fn jaccard_basics() {
        let a = vec!["grape".to_string()];
        let b = vec!["grape".to_string(), "raw".to_string()];
        assert!((token_jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert!((token_jaccard(&a, &a) - 1.0).abs() < 1e-9);
        assert_eq!(token_jaccard(&a, &[]), 0.0);
    }

    #[test]
    fn energy_similarity_degrades_with_distance() {
        assert!((energy_similarity(Some(67.0), 67.0) - 1.0).abs() < 1e-9);
        assert!((energy_similarity(Some(100.0), 50.0) - 0.5).abs() < 1e-9);
        assert_eq!(energy_similarity(Some(100.0), 300.0), 0.0);
        assert_eq!(energy_similarity(None, 42.0), 1.0);
    }

    #[test]
    fn exact_name_beats_partial_overlap() {
        let tokens = vec!["grape".to_string()];
        let context = ctx(&tokens, "grape", "grape");
        let exact = entry(1, "Grapes, raw", SourceTag::Foundation, FormTag::Raw, 67.0);
        let partial = entry(2, "Grape juice, canned", SourceTag::Legacy, FormTag::Unknown, 60.0);
        assert!(score_candidate(&exact, &context) > score_candidate(&partial, &context));
    }

    #[test]
    fn scrambled_intent_boosts_scrambled_entries() {
        let tokens = vec!["egg".to_string()];
        let mut context = ctx(&tokens, "egg", "egg");
        context.class_intent = Some(ClassIntent::EggsScrambled);

        let scrambled = entry(
            1,
            "Egg, whole, cooked, scrambled",
            SourceTag::Foundation,
            FormTag::Cooked,
            149.0,
        );
        let yolk = entry(2, "Egg, yolk, raw, frozen", SourceTag::Legacy, FormTag::Raw, 303.0);
        assert!(score_candidate(&scrambled, &context) > score_candidate(&yolk, &context) + 0.4);
    }

    #[test]
    fn egg_white_query_is_not_penalized_for_white() {
        let tokens = vec!["egg".to_string(), "white".to_string()];
        let mut context = ctx(&tokens, "egg white", "egg");
        context.class_intent = Some(ClassIntent::Eggs);

        let white = entry(1, "Egg, white, raw, fresh", SourceTag::Foundation, FormTag::Raw, 52.0);
        let whole = entry(2, "Egg, whole, raw, fresh", SourceTag::Foundation, FormTag::Raw, 143.0);
        assert!(score_candidate(&white, &context) > score_candidate(&whole, &context));
    }

    #[test]
    fn dessert_terms_sink_produce_candidates() {
        let tokens = vec!["zucchini".to_string()];
        let mut context = ctx(&tokens, "zucchini", "zucchini");
        context.class_intent = Some(ClassIntent::Produce);

        let raw = entry(1, "Zucchini, raw", SourceTag::Foundation, FormTag::Raw, 17.0);
        let baked = entry(2, "Zucchini bread", SourceTag::Legacy, FormTag::Unknown, 300.0);
        assert!(score_candidate(&raw, &context) - score_candidate(&baked, &context) > 0.3);
    }

    #[test]
    fn olive_nudges_prefer_table_olives() {
        let tokens = vec!["olive".to_string()];
        let context = ctx(&tokens, "olive", "olive");

        let table = entry(1, "Olives, ripe, canned", SourceTag::Foundation, FormTag::Unknown, 115.0);
        let stuffed = entry(2, "Olives, pickled, stuffed", SourceTag::Legacy, FormTag::Unknown, 145.0);
        assert!(score_candidate(&table, &context) > score_candidate(&stuffed, &context));
    }

    #[test]
    fn method_agreement_is_advisory() {
        let tokens = vec!["potato".to_string()];
        let mut context = ctx(&tokens, "potato", "potato");
        context.method = Some("roasted");

        let roasted = entry(1, "Potatoes, roasted", SourceTag::Foundation, FormTag::Cooked, 93.0);
        let boiled = entry(2, "Potatoes, boiled", SourceTag::Foundation, FormTag::Cooked, 87.0);
        assert!(score_candidate(&roasted, &context) > score_candidate(&boiled, &context));
    }

    #[test]
    fn category_rules_nudge_scores() {
        let rule = CategoryRule {
            allow_contains: vec!["flesh".into()],
            penalize_contains: vec!["au gratin".into()],
            hard_block_contains: vec![],
        };
        let tokens = vec!["potato".to_string()];
        let mut context = ctx(&tokens, "potato", "potato");
        context.category = Some(&rule);

        let flesh = entry(1, "Potatoes, flesh and skin, raw", SourceTag::Foundation, FormTag::Raw, 77.0);
        let gratin = entry(2, "Potatoes, au gratin", SourceTag::Legacy, FormTag::Cooked, 132.0);
        let plain = entry(3, "Potatoes, raw", SourceTag::Foundation, FormTag::Raw, 77.0);

        assert!(score_candidate(&flesh, &context) > score_candidate(&flesh, &ctx(&tokens, "potato", "potato")));
        assert!(score_candidate(&gratin, &context) < score_candidate(&gratin, &ctx(&tokens, "potato", "potato")));
        // Unmatched names are untouched by the rule.
        assert_eq!(
            score_candidate(&plain, &context),
            score_candidate(&plain, &ctx(&tokens, "potato", "potato"))
        );
    }

    #[test]
    fn stage_z_halves_large_nudges() {
        let tokens = vec!["olive".to_string()];
        let mut plain = ctx(&tokens, "olive", "olive");
        let mut staged = ctx(&tokens, "olive", "olive");
        plain.stage_z = false;
        staged.stage_z = true;

        let table = entry(1, "Olives, ripe", SourceTag::Branded, FormTag::Unknown, 115.0);
        let normal = score_candidate(&table, &plain);
        let damped = score_candidate(&table, &staged);
        // The +0.15 olive nudge halves to +0.075.
        assert!((normal - damped - 0.075).abs() < 1e-9);
    }

    #[test]
    fn near_ties_prefer_foundation_then_energy_then_name() {
        let tokens = vec!["grape".to_string()];
        let mut context = ctx(&tokens, "grape", "grape");
        context.predicted_kcal = Some(67.0);

        let foundation = entry(10, "Grapes, raw", SourceTag::Foundation, FormTag::Raw, 67.0);
        let legacy = entry(2, "Grapes, raw", SourceTag::Legacy, FormTag::Raw, 67.0);
        let pool = vec![legacy, foundation];
        let best = select_best(&pool, &context).unwrap();
        assert_eq!(best.entry.fdc_id, 10);
        assert_eq!(best.entry.source, SourceTag::Foundation);
    }

    #[test]
    fn ranking_is_deterministic_across_runs() {
        let tokens = vec!["carrot".to_string()];
        let context = ctx(&tokens, "carrot", "carrot");
        let pool = vec![
            entry(3, "Carrots, raw", SourceTag::Foundation, FormTag::Raw, 41.0),
            entry(1, "Carrots, baby, raw", SourceTag::Foundation, FormTag::Raw, 35.0),
            entry(2, "Carrot juice, canned", SourceTag::Legacy, FormTag::Unknown, 40.0),
        ];
        let first: Vec<i64> = rank_candidates(&pool, &context)
            .iter()
            .map(|c| c.entry.fdc_id)
            .collect();
        let second: Vec<i64> = rank_candidates(&pool, &context)
            .iter()
            .map(|c| c.entry.fdc_id)
            .collect();
        assert_eq!(first, second);
    }
}

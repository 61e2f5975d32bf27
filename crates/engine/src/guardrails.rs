//! Class-conditional pre-scoring candidate filters.
//!
//! Guardrails remove candidates the scorer must never see: pickled or canned
//! forms under produce intent, frozen yolk mixtures under egg intent, oil
//! and brined variants for olive queries. The one systematic exception: a
//! blocked substring that the query itself carries is deliberate ("pickled
//! eggplant" is allowed to find pickled entries), except for the olive
//! special case which blocks its variants regardless.

use configs::{CategoryAllowlist, NegativeVocabulary};
use ndb::FoodEntry;
use normalize::ClassIntent;

/// What guardrailing did, for telemetry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardrailReport {
    pub produce_applied: bool,
    pub eggs_applied: bool,
    pub rejections: usize,
    /// (candidate name, blocking term) pairs, recorded for diagnostics.
    pub rejected: Vec<(String, String)>,
}

/// Terms blocked for olive queries regardless of the canonical-name
/// exception.
const OLIVE_BLOCKS: &[&str] = &["oil", "stuffed", "brined"];

/// Filter `candidates` for one query.
pub fn apply_guardrails(
    candidates: Vec<FoodEntry>,
    class_intent: Option<ClassIntent>,
    canonical_name: &str,
    core_class: &str,
    vocabulary: &NegativeVocabulary,
    allowlist: &CategoryAllowlist,
) -> (Vec<FoodEntry>, GuardrailReport) {
    let mut report = GuardrailReport::default();
    let class_vocab = vocabulary.classes.get(core_class);
    let category_rule = allowlist.for_class(core_class);

    let survivors = candidates
        .into_iter()
        .filter(|candidate| {
            let name = candidate.name_lower();

            // Olive queries use their own block list instead of the generic
            // produce one: table olives are canned/cured by nature, so the
            // generic processed-form blocks would reject every real entry.
            if matches!(
                class_intent,
                Some(ClassIntent::Produce) | Some(ClassIntent::LeafyOrCrucifer)
            ) && core_class != "olive"
            {
                if let Some(term) = blocking_term(&name, canonical_name, &vocabulary.produce_hard_blocks) {
                    report.produce_applied = true;
                    report.rejections += 1;
                    report.rejected.push((candidate.name.clone(), term));
                    return false;
                }
            }

            if matches!(
                class_intent,
                Some(ClassIntent::Eggs) | Some(ClassIntent::EggsScrambled)
            ) {
                if let Some(term) = blocking_term(&name, canonical_name, &vocabulary.eggs_hard_blocks) {
                    report.eggs_applied = true;
                    report.rejections += 1;
                    report.rejected.push((candidate.name.clone(), term));
                    return false;
                }
            }

            if core_class == "olive" {
                if let Some(term) = OLIVE_BLOCKS.iter().find(|term| name.contains(*term)) {
                    report.produce_applied = true;
                    report.rejections += 1;
                    report
                        .rejected
                        .push((candidate.name.clone(), (*term).to_string()));
                    return false;
                }
            }

            if let Some(terms) = class_vocab {
                if let Some(term) = blocking_term(&name, canonical_name, terms) {
                    report.rejections += 1;
                    report.rejected.push((candidate.name.clone(), term));
                    return false;
                }
            }

            if let Some(rule) = category_rule {
                if let Some(term) = blocking_term(&name, canonical_name, &rule.hard_block_contains) {
                    report.rejections += 1;
                    report.rejected.push((candidate.name.clone(), term));
                    return false;
                }
            }

            true
        })
        .collect();

    (survivors, report)
}

/// First term in `terms` that occurs in the candidate name but not in the
/// canonical query name.
fn blocking_term(
    candidate_name: &str,
    canonical_name: &str,
    terms: &[String],
) -> Option<String> {
    terms
        .iter()
        .find(|term| candidate_name.contains(term.as_str()) && !canonical_name.contains(term.as_str()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndb::{FormTag, Nutrients, SourceTag};

    fn entry(fdc_id: i64, name: &str) -> FoodEntry {
        FoodEntry {
            fdc_id,
            name: name.to_string(),
            source: SourceTag::Foundation,
            form: FormTag::Raw,
            nutrients: Nutrients::default(),
        }
    }

    fn vocab() -> NegativeVocabulary {
        NegativeVocabulary::default()
    }

    #[test]
    fn produce_intent_blocks_processed_forms() {
        let pool = vec![
            entry(1, "Eggplant, raw"),
            entry(2, "Eggplant, pickled"),
            entry(3, "Eggplant, frozen"),
        ];
        let (survivors, report) = apply_guardrails(
            pool,
            Some(ClassIntent::Produce),
            "eggplant",
            "eggplant",
            &vocab(),
            &CategoryAllowlist::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].fdc_id, 1);
        assert!(report.produce_applied);
        assert_eq!(report.rejections, 2);
    }

    #[test]
    fn canonical_name_exception_permits_the_term() {
        // "pickled eggplant" deliberately seeks pickled forms.
        let pool = vec![entry(1, "Eggplant, pickled"), entry(2, "Eggplant, frozen")];
        let (survivors, report) = apply_guardrails(
            pool,
            Some(ClassIntent::Produce),
            "pickled eggplant",
            "eggplant",
            &vocab(),
            &CategoryAllowlist::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].fdc_id, 1);
        assert_eq!(report.rejections, 1);
    }

    #[test]
    fn egg_intent_blocks_frozen_mixtures_and_bread() {
        let pool = vec![
            entry(1, "Egg, whole, raw, fresh"),
            entry(2, "Egg, yolk raw frozen"),
            entry(3, "Egg substitute, powder"),
            entry(4, "Bread, egg, toasted"),
        ];
        let (survivors, report) = apply_guardrails(
            pool,
            Some(ClassIntent::Eggs),
            "egg",
            "egg",
            &vocab(),
            &CategoryAllowlist::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].fdc_id, 1);
        assert!(report.eggs_applied);
        assert_eq!(report.rejections, 3);
    }

    #[test]
    fn olive_blocks_apply_even_when_query_names_them() {
        let pool = vec![
            entry(1, "Olives, ripe, canned"),
            entry(2, "Olive oil, extra virgin"),
            entry(3, "Olives, stuffed with pimiento"),
        ];
        // Even a query literally naming oil keeps the block.
        let (survivors, _) = apply_guardrails(
            pool,
            Some(ClassIntent::Produce),
            "olive oil",
            "olive",
            &vocab(),
            &CategoryAllowlist::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].fdc_id, 1);
    }

    #[test]
    fn class_specific_vocabulary_is_hard_blocking() {
        let mut vocabulary = vocab();
        vocabulary
            .classes
            .insert("cucumber".into(), vec!["sea cucumber".into()]);
        let pool = vec![
            entry(1, "Cucumber, with peel, raw"),
            entry(2, "Sea cucumber, yane"),
        ];
        let (survivors, _) = apply_guardrails(
            pool,
            Some(ClassIntent::Produce),
            "cucumber",
            "cucumber",
            &vocabulary,
            &CategoryAllowlist::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].fdc_id, 1);
    }

    #[test]
    fn no_intent_means_only_class_rules_apply() {
        let pool = vec![entry(1, "Beef, pickled"), entry(2, "Beef, raw")];
        let (survivors, report) = apply_guardrails(
            pool,
            None,
            "beef",
            "beef",
            &vocab(),
            &CategoryAllowlist::default(),
        );
        assert_eq!(survivors.len(), 2);
        assert_eq!(report.rejections, 0);
    }

    #[test]
    fn olives_reject_oil_variants_guardrail_scenario() {
        // The ripe/black table olive survives; oil is filtered.
        let pool = vec![
            entry(1, "Olives, ripe, canned (small-extra large)"),
            entry(2, "Oil, olive, salad or cooking"),
        ];
        let (survivors, report) = apply_guardrails(
            pool,
            Some(ClassIntent::Produce),
            "olive",
            "olive",
            &vocab(),
            &CategoryAllowlist::default(),
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].fdc_id, 1);
        assert!(report.produce_applied);
    }
}

//! Coarse class and form intent, consumed by guardrails and scoring.

use serde::{Deserialize, Serialize};

use crate::query::NormalizedQuery;
use crate::vocab::{COOKED_FORMS, RAW_FORMS};

/// Coarse food-class intent. First matching rule wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassIntent {
    Eggs,
    EggsScrambled,
    Produce,
    LeafyOrCrucifer,
}

/// Coarse cooking-state intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormIntent {
    Raw,
    Cooked,
}

const LEAFY_OR_CRUCIFER: &[&str] = &[
    "brussels sprout",
    "cauliflower",
    "broccoli",
    "kale",
    "cabbage",
];

const PRODUCE: &[&str] = &[
    "yellow squash",
    "zucchini",
    "asparagus",
    "pumpkin",
    "corn",
    "eggplant",
    "pepper",
    "tomato",
    "cucumber",
    "potato",
    "sweet potato",
    "carrot",
    "mushroom",
    "olive",
    "avocado",
    "celery",
    "spinach",
    "lettuce",
    "grape",
    "apple",
    "banana",
    "berry",
    "strawberry",
    "blueberry",
    "raspberry",
    "cherry",
    "melon",
    "watermelon",
    "orange",
    "peach",
    "pear",
    "fruit",
];

/// Derive the class intent from a normalized query.
pub fn derive_class_intent(query: &NormalizedQuery) -> Option<ClassIntent> {
    let name = query.canonical_name.as_str();
    let has_egg = query.tokens.iter().any(|t| t == "egg");
    if has_egg {
        let scrambled = query.method.as_deref() == Some("scrambled")
            || query.form.as_deref() == Some("scrambled")
            || name.contains("scrambled");
        return Some(if scrambled {
            ClassIntent::EggsScrambled
        } else {
            ClassIntent::Eggs
        });
    }
    if LEAFY_OR_CRUCIFER.iter().any(|c| name.contains(c)) {
        return Some(ClassIntent::LeafyOrCrucifer);
    }
    // "sea cucumber" carries the cucumber substring but is an animal; the
    // compound token keeps its core class distinct, so gate on that.
    if query.core_class == "sea_cucumber" {
        return None;
    }
    if PRODUCE.iter().any(|c| name.contains(c)) {
        return Some(ClassIntent::Produce);
    }
    None
}

/// Derive the form intent from a normalized form string.
pub fn derive_form_intent(form: Option<&str>) -> Option<FormIntent> {
    let form = form.unwrap_or("");
    if RAW_FORMS.contains(&form) {
        if form.is_empty() {
            return None;
        }
        return Some(FormIntent::Raw);
    }
    if COOKED_FORMS.contains(&form) {
        return Some(FormIntent::Cooked);
    }
    None
}

//! Built-in proxy decompositions (Stage 5B).
//!
//! Salads are the one composite family handled by rule rather than by a
//! configured template: the component set is stable enough to hardcode, and
//! the stage exists mainly so a "caesar salad" detection does not fall all
//! the way to Stage Z. The execution machinery is shared with Stage 5C:
//! these are ordinary templates, just constructed in code.

use configs::{RecipeComponent, RecipeTemplate};

fn component(key: &str, ratio: f64, prefer: &[&str]) -> RecipeComponent {
    RecipeComponent {
        key: key.to_string(),
        ratio,
        prefer: prefer.iter().map(|p| (*p).to_string()).collect(),
        fdc_ids: Vec::new(),
        kcal_per_100g: None,
        reject_patterns: Vec::new(),
    }
}

fn template(name: &str, triggers: &[&str], components: Vec<RecipeComponent>) -> RecipeTemplate {
    RecipeTemplate {
        name: name.to_string(),
        triggers: triggers.iter().map(|t| (*t).to_string()).collect(),
        components,
        sha256: String::new(),
        source_file: "builtin".to_string(),
    }
}

/// The built-in salad template matching `canonical_name`, if any.
pub fn salad_template(canonical_name: &str) -> Option<RecipeTemplate> {
    if canonical_name.contains("caesar salad") {
        return Some(template(
            "caesar_salad",
            &["caesar salad"],
            vec![
                component("romaine lettuce", 0.55, &[]),
                component("parmesan cheese", 0.15, &[]),
                component("crouton", 0.20, &[]),
                component("caesar dressing", 0.10, &["caesar_dressing"]),
            ],
        ));
    }
    if canonical_name.contains("house salad") || canonical_name.contains("garden salad") {
        return Some(template(
            "house_salad",
            &["house salad", "garden salad"],
            vec![
                component("mixed greens", 0.60, &[]),
                component("tomato", 0.20, &[]),
                component("cucumber", 0.15, &[]),
                component("salad dressing", 0.05, &["salad_dressing"]),
            ],
        ));
    }
    None
}

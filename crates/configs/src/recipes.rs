//! Recipe decomposition templates.
//!
//! One template per YAML file under `recipes/`. Template evaluation order is
//! the sorted file name, which is what makes "first trigger match wins"
//! deterministic across filesystems. Each template's raw bytes are hashed at
//! load so telemetry can record exactly which revision of a template split a
//! food.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::fingerprint::sha256_hex;

/// Tolerance for the component-ratio sum invariant.
pub const RATIO_SUM_TOLERANCE: f64 = 1e-6;

/// One fixed-ratio component of a recipe template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeComponent {
    /// Canonical key of the component food; also the synthetic query name
    /// when the component is aligned recursively.
    pub key: String,
    /// Mass fraction of the whole, in (0, 1].
    pub ratio: f64,
    /// Stage Z fallback keys tried before recursive alignment.
    #[serde(default)]
    pub prefer: Vec<String>,
    /// Pinned NDB identifiers tried first, in order.
    #[serde(default)]
    pub fdc_ids: Vec<i64>,
    /// Optional kcal/100 g window a pinned identifier must satisfy.
    #[serde(default)]
    pub kcal_per_100g: Option<[f64; 2]>,
    /// Name substrings that disqualify a resolved entry.
    #[serde(default)]
    pub reject_patterns: Vec<String>,
}

/// A named decomposition template with trigger substrings and components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeTemplate {
    pub name: String,
    /// Substrings matched against the canonical query name.
    pub triggers: Vec<String>,
    pub components: Vec<RecipeComponent>,
    /// SHA-256 of the template file, filled at load time.
    #[serde(skip)]
    pub sha256: String,
    /// Source file name, for telemetry and error messages.
    #[serde(skip)]
    pub source_file: String,
}

impl RecipeTemplate {
    /// Whether any trigger substring occurs in `canonical_name`.
    pub fn matches(&self, canonical_name: &str) -> bool {
        self.triggers.iter().any(|t| canonical_name.contains(t))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let doc = format!("recipes/{}", self.source_file);
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation(&doc, "template name is empty"));
        }
        if self.triggers.is_empty() {
            return Err(ConfigError::validation(&doc, "template has no triggers"));
        }
        if self.components.is_empty() {
            return Err(ConfigError::validation(&doc, "template has no components"));
        }
        let mut sum = 0.0;
        for component in &self.components {
            if component.ratio <= 0.0 || component.ratio > 1.0 {
                return Err(ConfigError::validation(
                    &doc,
                    format!("component {}: ratio outside (0, 1]", component.key),
                ));
            }
            if let Some([min, max]) = component.kcal_per_100g {
                if min > max {
                    return Err(ConfigError::validation(
                        &doc,
                        format!("component {}: kcal window min exceeds max", component.key),
                    ));
                }
            }
            sum += component.ratio;
        }
        if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
            return Err(ConfigError::validation(
                &doc,
                format!("component ratios sum to {sum}, expected 1.0"),
            ));
        }
        Ok(())
    }
}

/// Load every `*.yml` template under `dir`, sorted by file name.
///
/// A missing directory is an empty template set; a template that fails to
/// parse or validate aborts the whole load.
pub(crate) fn load_templates(dir: &Path) -> Result<Vec<RecipeTemplate>, ConfigError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        document: dir.display().to_string(),
        source,
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext == "yml" || ext == "yaml")
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = fs::read(&path).map_err(|source| ConfigError::Io {
            document: format!("recipes/{file_name}"),
            source,
        })?;
        let mut template: RecipeTemplate =
            serde_yaml::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                document: format!("recipes/{file_name}"),
                source,
            })?;
        template.sha256 = sha256_hex(&bytes);
        template.source_file = file_name;
        template.validate()?;
        templates.push(template);
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn template(ratios: &[f64]) -> RecipeTemplate {
        RecipeTemplate {
            name: "test".into(),
            triggers: vec!["test".into()],
            components: ratios
                .iter()
                .enumerate()
                .map(|(idx, ratio)| RecipeComponent {
                    key: format!("component-{idx}"),
                    ratio: *ratio,
                    prefer: vec![],
                    fdc_ids: vec![],
                    kcal_per_100g: None,
                    reject_patterns: vec![],
                })
                .collect(),
            sha256: String::new(),
            source_file: "test.yml".into(),
        }
    }

    #[test]
    fn ratios_must_sum_to_one() {
        assert!(template(&[0.5, 0.3, 0.15, 0.05]).validate().is_ok());
        assert!(template(&[0.5, 0.3]).validate().is_err());
    }

    #[test]
    fn ratio_sum_tolerates_float_noise() {
        assert!(template(&[0.1; 10]).validate().is_ok());
    }

    #[test]
    fn trigger_matching_is_substring_based() {
        let mut t = template(&[1.0]);
        t.triggers = vec!["cheese pizza".into(), "margherita".into()];
        assert!(t.matches("cheese pizza slice"));
        assert!(t.matches("margherita"));
        assert!(!t.matches("pepperoni pizza"));
    }

    #[test]
    fn templates_load_sorted_and_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let recipes = dir.path().join("recipes");
        fs::create_dir(&recipes).unwrap();

        let write = |name: &str, body: &str| {
            let mut file = fs::File::create(recipes.join(name)).unwrap();
            file.write_all(body.as_bytes()).unwrap();
        };
        write(
            "b_salad.yml",
            "name: salad\ntriggers: [salad]\ncomponents:\n  - { key: greens, ratio: 1.0 }\n",
        );
        write(
            "a_pizza.yml",
            "name: pizza\ntriggers: [pizza]\ncomponents:\n  - { key: crust, ratio: 1.0 }\n",
        );

        let templates = load_templates(&recipes).unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].name, "pizza");
        assert_eq!(templates[1].name, "salad");
        assert_eq!(templates[0].sha256.len(), 64);
        assert_eq!(templates[0].source_file, "a_pizza.yml");
    }

    #[test]
    fn missing_directory_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let templates = load_templates(&dir.path().join("recipes")).unwrap();
        assert!(templates.is_empty());
    }

    #[test]
    fn invalid_template_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        let recipes = dir.path().join("recipes");
        fs::create_dir(&recipes).unwrap();
        fs::write(
            recipes.join("bad.yml"),
            "name: bad\ntriggers: [bad]\ncomponents:\n  - { key: x, ratio: 0.4 }\n",
        )
        .unwrap();
        assert!(load_templates(&recipes).is_err());
    }
}

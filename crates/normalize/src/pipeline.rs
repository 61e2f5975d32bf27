//! The normalization pipeline.
//!
//! Rules run in a fixed order: sentinel detection, parenthetical collapse,
//! spelling fixes, peel extraction, compound preservation, tokenization,
//! form extraction, singularization, core-class reduction. The function is
//! pure (no configuration, no I/O), so the engine can re-derive a query at
//! any time and get a byte-identical result.

use thiserror::Error;

use crate::query::{NormalizedQuery, QueryHints};
use crate::vocab::{
    CLASS_TOKENS, COMPOUND_TOKENS, LOW_CONFIDENCE_NOTES, NAME_FORM_TOKENS, PLURAL_MAP,
};

/// Errors produced by normalization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// The name is empty after trimming.
    #[error("food name is empty")]
    EmptyName,
}

/// Normalize a raw food name plus optional explicit form.
///
/// The explicit `form` (from the vision detection) wins over any form word
/// found inside the name; either way the form word is removed from the token
/// stream and reported through the `form` / `method` fields.
pub fn normalize(name: &str, form: Option<&str>) -> Result<NormalizedQuery, NormalizeError> {
    let mut working = name.trim().to_lowercase();
    if working.is_empty() {
        return Err(NormalizeError::EmptyName);
    }

    // Sentinel: upstream marks dead detections with a literal "deprecated".
    if working == "deprecated" {
        return Ok(NormalizedQuery {
            canonical_name: "deprecated".to_string(),
            tokens: Vec::new(),
            form: None,
            method: None,
            core_class: "deprecated".to_string(),
            hints: QueryHints {
                ignored_class: Some("deprecated".to_string()),
                ..QueryHints::default()
            },
        });
    }

    working = collapse_duplicate_parentheticals(&working);
    working = working.replace("sun-dried", "sun_dried");
    working = working.replace("sun dried", "sun_dried");

    let mut hints = QueryHints::default();
    if let Some(rest) = strip_phrase(&working, "without peel").or_else(|| strip_phrase(&working, "no peel")) {
        hints.peel = Some(false);
        working = rest;
    } else if let Some(rest) = strip_phrase(&working, "with peel") {
        hints.peel = Some(true);
        working = rest;
    }

    for (needle, note) in LOW_CONFIDENCE_NOTES {
        if working.contains(needle) {
            hints.low_confidence_note = Some((*note).to_string());
            break;
        }
    }

    // Compound preservation must happen before token splitting so the
    // compound survives as one token.
    for compound in COMPOUND_TOKENS {
        if working.contains(compound) {
            let joined = compound.replace(' ', "_");
            working = working.replace(compound, &joined);
            hints.compound_preserved.push(joined);
        }
    }

    let mut tokens = split_and_singularize(&working);

    // Form resolution: explicit form wins; otherwise the first recognized
    // form word inside the name. "omelet" implies cooked + scrambled.
    let mut resolved_form = form.map(normalize_form_string).filter(|f| !f.is_empty());
    let mut method = None;
    if tokens.iter().any(|t| t == "omelet" || t == "omelette") {
        tokens.retain(|t| t != "omelet" && t != "omelette");
        if resolved_form.is_none() {
            resolved_form = Some("cooked".to_string());
        }
        method = Some("scrambled".to_string());
    }
    if resolved_form.is_none() {
        if let Some(found) = tokens
            .iter()
            .find(|t| NAME_FORM_TOKENS.contains(&t.as_str()))
            .cloned()
        {
            resolved_form = Some(found);
        }
    }
    // Form words never stay in the token stream; they are carried by the
    // form/method fields instead.
    tokens.retain(|t| !NAME_FORM_TOKENS.contains(&t.as_str()));

    if method.is_none() {
        method = resolved_form
            .as_deref()
            .filter(|f| *f != "raw" && *f != "fresh" && *f != "cooked")
            .map(str::to_string);
    }

    if tokens.is_empty() {
        return Err(NormalizeError::EmptyName);
    }

    let canonical_name = tokens.join(" ").replace('_', " ");
    let core_class = reduce_core_class(&tokens);

    Ok(NormalizedQuery {
        canonical_name,
        tokens,
        form: resolved_form,
        method,
        core_class,
        hints,
    })
}

/// Tokenize a database entry name the same way query names are tokenized:
/// lowercase, compound-aware, punctuation-split, singularized, deduplicated.
pub fn tokenize(name: &str) -> Vec<String> {
    let mut working = name.to_lowercase();
    working = working.replace("sun-dried", "sun_dried");
    working = working.replace("sun dried", "sun_dried");
    for compound in COMPOUND_TOKENS {
        if working.contains(compound) {
            working = working.replace(compound, &compound.replace(' ', "_"));
        }
    }
    split_and_singularize(&working)
}

/// Collapse `x (y) (y)` into `x (y)`.
fn collapse_duplicate_parentheticals(name: &str) -> String {
    let mut result = name.to_string();
    let mut search_from = 0;
    while let Some(open_rel) = result[search_from..].find('(') {
        let open = search_from + open_rel;
        let Some(close_rel) = result[open..].find(')') else {
            break;
        };
        let close = open + close_rel;
        let group = result[open..=close].to_string();
        // Remove immediately-following repeats of the same group.
        loop {
            let tail = &result[close + 1..];
            let trimmed = tail.trim_start();
            if trimmed.starts_with(&group) {
                let whitespace = tail.len() - trimmed.len();
                let end = close + 1 + whitespace + group.len();
                result.replace_range(close + 1..end, "");
            } else {
                break;
            }
        }
        search_from = close + 1;
    }
    result
}

/// Remove `phrase` from the name, returning the cleaned remainder when the
/// phrase was present.
fn strip_phrase(name: &str, phrase: &str) -> Option<String> {
    if !name.contains(phrase) {
        return None;
    }
    let cleaned = name.replace(phrase, " ");
    Some(cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn split_and_singularize(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in name.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if raw.is_empty() {
            continue;
        }
        let singular = PLURAL_MAP
            .iter()
            .find(|(plural, _)| *plural == raw)
            .map(|(_, singular)| (*singular).to_string())
            .unwrap_or_else(|| raw.to_string());
        if !tokens.contains(&singular) {
            tokens.push(singular);
        }
    }
    tokens
}

fn normalize_form_string(form: &str) -> String {
    form.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Core-class reduction: the first recognized class token, else the head
/// noun (last token).
fn reduce_core_class(tokens: &[String]) -> String {
    tokens
        .iter()
        .find(|t| CLASS_TOKENS.contains(&t.as_str()))
        .cloned()
        .unwrap_or_else(|| tokens.last().cloned().unwrap_or_default())
}

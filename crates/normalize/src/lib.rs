//! Canonicalization of vision-detected food names.
//!
//! [`normalize`] turns a raw detection like `"Roasted Brussels Sprouts"` into
//! a [`NormalizedQuery`]: canonical name, ordered deduplicated tokens (with
//! compound foods preserved as single tokens so `sweet potato` never
//! collides with `potato`), a normalized cooking form, an optional concrete
//! method, a core class key, and structured hints.
//!
//! Normalization is a pure function: the same input always yields an
//! identical output, including hint ordering. Everything downstream (class
//! intent, guardrails, scoring, Stage Z keys) is derived from this one
//! canonical view, so the rules here run exactly once per food.

mod intent;
mod pipeline;
mod query;
mod vocab;

pub use intent::{derive_class_intent, derive_form_intent, ClassIntent, FormIntent};
pub use pipeline::{normalize, tokenize, NormalizeError};
pub use query::{NormalizedQuery, QueryHints};
pub use vocab::{COMPOUND_TOKENS, COOKED_FORMS, RAW_FORMS};

//! Umbrella crate for the food-alignment pipeline.
//!
//! `foodalign` re-exports the configuration, database-adapter,
//! normalization, conversion, semantic-retrieval, and engine layers so
//! applications can drive the full pipeline through a single dependency.
//! The crate adds the external request/response contract
//! ([`AlignmentRequest`] / [`AlignmentResponse`]), the [`align_image`]
//! orchestration helper, and the line-delimited JSON telemetry sink.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use foodalign::{
//!     align_image, AlignmentEngine, AlignmentRequest, ConfigSnapshot, FoodQuery,
//!     JsonlTelemetrySink, MemoryNdb, TelemetrySink,
//! };
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let configs = Arc::new(ConfigSnapshot::load_dir("config")?);
//! let ndb = MemoryNdb::from_snapshot_file("ndb.json")?;
//! let mut engine = AlignmentEngine::new(ndb, configs)?;
//!
//! let request = AlignmentRequest {
//!     image_id: "img-001".into(),
//!     foods: vec![FoodQuery::named("grape")],
//!     config_fingerprint: None,
//! };
//! let sink = JsonlTelemetrySink::stdout();
//! let response = align_image(&mut engine, &request, Some(&sink))?;
//! assert_eq!(response.foods.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Telemetry
//!
//! Every aligned food emits one [`TelemetryEvent`], written through the
//! [`TelemetrySink`] trait. [`JsonlTelemetrySink`] renders one JSON object
//! per line behind a shared writer; consumers must tolerate unknown keys.
//!
//! ## Errors
//!
//! Failures converge on [`AlignError`]. Batch callers fail fast on
//! `database_unavailable`; interactive callers should map it to an
//! `available: false` response instead (see [`AlignError::is_database_unavailable`]).

pub use configs::{
    BrandedFallback, BrandedFallbacks, CategoryAllowlist, ClassThresholds, ConfigError,
    ConfigSnapshot, CookConversions, EnergyGuards, FeatureFlags, NegativeVocabulary,
    RecipeComponent, RecipeTemplate, UnitToGrams, Variants,
};
pub use convert::{convert, ConversionSteps, ConvertError};
pub use engine::{
    AlignError, AlignmentEngine, AlignmentResult, AlignmentStage, FoodQuery, GuardSummary,
    Stage1cSwitch, StageZRecord, TelemetryEvent,
};
pub use ndb::{
    CachedNdb, FoodEntry, FormTag, MemoryNdb, NdbAdapter, NdbError, Nutrients, SourceFilter,
    SourceTag,
};
pub use normalize::{
    derive_class_intent, derive_form_intent, normalize, ClassIntent, FormIntent, NormalizedQuery,
};
pub use semantic::{
    HashEmbedder, QueryEmbedder, SemanticError, SemanticIndex, SemanticRetriever,
};

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// One alignment request: a single image's detected foods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentRequest {
    pub image_id: String,
    pub foods: Vec<FoodQuery>,
    /// Optional fingerprint pin: when present it must match the loaded
    /// snapshot, otherwise the request is refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_fingerprint: Option<String>,
}

/// The aligned response for one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentResponse {
    pub image_id: String,
    pub foods: Vec<AlignmentResult>,
    pub config_version: String,
    pub ndb_snapshot: String,
    pub code_revision: String,
}

/// Sink for per-food telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// Writes one JSON object per line to a shared writer.
pub struct JsonlTelemetrySink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl JsonlTelemetrySink {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}

impl TelemetrySink for JsonlTelemetrySink {
    fn emit(&self, event: &TelemetryEvent) {
        if let Ok(mut writer) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(event) {
                let _ = writeln!(writer, "{line}");
            }
        }
    }
}

/// Align every food of one request, emitting telemetry per food.
///
/// Decomposed foods emit one event for the parent and one per child, in
/// parent-then-children order.
pub fn align_image<A: NdbAdapter>(
    engine: &mut AlignmentEngine<A>,
    request: &AlignmentRequest,
    sink: Option<&dyn TelemetrySink>,
) -> Result<AlignmentResponse, AlignError> {
    if let Some(requested) = &request.config_fingerprint {
        if requested != engine.config_fingerprint() {
            return Err(AlignError::Config(ConfigError::FingerprintMismatch {
                requested: requested.clone(),
                loaded: engine.config_fingerprint().to_string(),
            }));
        }
    }

    let mut foods = Vec::with_capacity(request.foods.len());
    for (food_idx, query) in request.foods.iter().enumerate() {
        let result = engine.align_food(&request.image_id, food_idx, query)?;
        if let Some(sink) = sink {
            emit_recursive(sink, &result);
        }
        foods.push(result);
    }

    Ok(AlignmentResponse {
        image_id: request.image_id.clone(),
        foods,
        config_version: engine.config_fingerprint().to_string(),
        ndb_snapshot: engine.ndb_snapshot().to_string(),
        code_revision: code_revision(),
    })
}

fn emit_recursive(sink: &dyn TelemetrySink, result: &AlignmentResult) {
    sink.emit(&result.telemetry);
    for child in &result.expanded_foods {
        emit_recursive(sink, child);
    }
}

/// Code revision stamped into responses: an injected git SHA when the build
/// provides one, else the crate version.
pub fn code_revision() -> String {
    option_env!("FOODALIGN_GIT_SHA")
        .unwrap_or(env!("CARGO_PKG_VERSION"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_engine() -> AlignmentEngine<MemoryNdb> {
        let mut ndb = MemoryNdb::new();
        ndb.insert(FoodEntry {
            fdc_id: 1001,
            name: "Grapes, raw".into(),
            source: SourceTag::Foundation,
            form: FormTag::Raw,
            nutrients: Nutrients {
                energy_kcal: 67.0,
                protein_g: 0.6,
                carbs_g: 17.2,
                fat_g: 0.3,
                micros: None,
            },
        });
        AlignmentEngine::new(ndb, Arc::new(ConfigSnapshot::default_snapshot())).unwrap()
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl TelemetrySink for RecordingSink {
        fn emit(&self, event: &TelemetryEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn align_image_answers_every_food() {
        let mut engine = test_engine();
        let request = AlignmentRequest {
            image_id: "img-1".into(),
            foods: vec![FoodQuery::named("grape"), FoodQuery::named("unobtainium")],
            config_fingerprint: None,
        };
        let sink = RecordingSink::default();
        let response = align_image(&mut engine, &request, Some(&sink)).unwrap();

        assert_eq!(response.foods.len(), 2);
        assert!(response.foods[0].available);
        assert!(!response.foods[1].available);
        assert_eq!(sink.events.lock().unwrap().len(), 2);
        assert!(response.config_version.starts_with("configs@"));
    }

    #[test]
    fn stale_fingerprint_is_refused() {
        let mut engine = test_engine();
        let request = AlignmentRequest {
            image_id: "img-2".into(),
            foods: vec![FoodQuery::named("grape")],
            config_fingerprint: Some("configs@000000000000".into()),
        };
        let err = align_image(&mut engine, &request, None).unwrap_err();
        assert!(matches!(
            err,
            AlignError::Config(ConfigError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn matching_fingerprint_is_accepted() {
        let mut engine = test_engine();
        let fingerprint = engine.config_fingerprint().to_string();
        let request = AlignmentRequest {
            image_id: "img-3".into(),
            foods: vec![FoodQuery::named("grape")],
            config_fingerprint: Some(fingerprint),
        };
        assert!(align_image(&mut engine, &request, None).is_ok());
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_event() {
        let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        struct SharedWriter(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let sink = JsonlTelemetrySink::new(Box::new(SharedWriter(Arc::clone(&buffer))));
        let mut engine = test_engine();
        let request = AlignmentRequest {
            image_id: "img-4".into(),
            foods: vec![FoodQuery::named("grape")],
            config_fingerprint: None,
        };
        align_image(&mut engine, &request, Some(&sink)).unwrap();

        let written = buffer.lock().unwrap();
        let text = String::from_utf8(written.clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["image_id"], "img-4");
        assert_eq!(parsed["alignment_stage"], "stage1b");
    }
}

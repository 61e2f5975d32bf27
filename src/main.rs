//! Batch alignment runner.
//!
//! Reads a JSON file of alignment requests, aligns every food against the
//! configured NDB snapshot, writes one response per request to stdout, and
//! streams per-food telemetry to a JSONL file.
//!
//! ```text
//! foodalign --config-dir config --ndb ndb.json --input requests.json \
//!           [--telemetry telemetry.jsonl] [--semantic-index DIR]
//! ```
//!
//! Exit codes: 0 success, 2 configuration missing or invalid, 3 database
//! unavailable at startup, 4 hard batch assertion failed, 1 anything else.

use std::fs;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use foodalign::{
    align_image, AlignError, AlignmentEngine, AlignmentRequest, CachedNdb, ConfigSnapshot,
    HashEmbedder, JsonlTelemetrySink, MemoryNdb, NdbAdapter, SemanticIndex, SemanticRetriever,
};

const EXIT_CONFIG: u8 = 2;
const EXIT_DATABASE: u8 = 3;
const EXIT_ASSERTION: u8 = 4;

/// Inputs this large must exercise Stage Z when fallbacks are configured.
const STAGE_Z_ASSERTION_MIN_FOODS: usize = 100;

struct Args {
    config_dir: String,
    ndb_path: String,
    input_path: String,
    telemetry_path: Option<String>,
    semantic_index: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut config_dir = None;
    let mut ndb_path = None;
    let mut input_path = None;
    let mut telemetry_path = None;
    let mut semantic_index = None;

    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        let mut take = |name: &str| {
            args.next()
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match flag.as_str() {
            "--config-dir" => config_dir = Some(take("--config-dir")?),
            "--ndb" => ndb_path = Some(take("--ndb")?),
            "--input" => input_path = Some(take("--input")?),
            "--telemetry" => telemetry_path = Some(take("--telemetry")?),
            "--semantic-index" => semantic_index = Some(take("--semantic-index")?),
            other => return Err(format!("unknown flag: {other}")),
        }
    }

    Ok(Args {
        config_dir: config_dir.ok_or("--config-dir is required")?,
        ndb_path: ndb_path.ok_or("--ndb is required")?,
        input_path: input_path.ok_or("--input is required")?,
        telemetry_path,
        semantic_index,
    })
}

fn read_requests(path: &str) -> Result<Vec<AlignmentRequest>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
    // A single request object or an array of them.
    if let Ok(single) = serde_json::from_str::<AlignmentRequest>(&text) {
        return Ok(vec![single]);
    }
    serde_json::from_str(&text).map_err(|e| format!("cannot parse {path}: {e}"))
}

fn run() -> Result<u8, (u8, String)> {
    let args = parse_args().map_err(|e| (1, e))?;

    let configs = match ConfigSnapshot::load_dir(&args.config_dir) {
        Ok(snapshot) => Arc::new(snapshot),
        Err(err) => return Err((EXIT_CONFIG, err.to_string())),
    };
    info!(
        fingerprint = configs.fingerprint(),
        started_at = %chrono::Utc::now().to_rfc3339(),
        "configuration loaded"
    );

    let ndb = MemoryNdb::from_snapshot_file(&args.ndb_path)
        .map_err(|e| (EXIT_DATABASE, format!("database_unavailable: {e}")))?;
    let adapter: Arc<dyn NdbAdapter> = if configs.feature_flags().enable_alignment_caches {
        Arc::new(CachedNdb::new(ndb))
    } else {
        Arc::new(ndb)
    };

    let mut engine = AlignmentEngine::new(adapter, Arc::clone(&configs))
        .map_err(|e| classify_align_error(&e))?;

    if configs.feature_flags().enable_semantic_search {
        if let Some(dir) = &args.semantic_index {
            match SemanticIndex::load(dir) {
                Ok(index) => {
                    engine =
                        engine.with_semantic(SemanticRetriever::new(index, Box::new(HashEmbedder::new())));
                    info!(dir = %dir, "semantic index attached");
                }
                Err(err) => {
                    // semantic_unavailable: warn once, stage 1S stays off.
                    warn!(%err, "semantic index unavailable; stage 1S disabled");
                }
            }
        }
    }

    let requests = read_requests(&args.input_path).map_err(|e| (1, e))?;
    let sink = match &args.telemetry_path {
        Some(path) => {
            let file = fs::File::create(path).map_err(|e| (1, format!("cannot create {path}: {e}")))?;
            JsonlTelemetrySink::new(Box::new(file))
        }
        // Responses own stdout; default telemetry goes to stderr.
        None => JsonlTelemetrySink::new(Box::new(std::io::stderr())),
    };

    let mut total_foods = 0usize;
    let stdout = std::io::stdout();
    for request in &requests {
        total_foods += request.foods.len();
        let response =
            align_image(&mut engine, request, Some(&sink)).map_err(|e| classify_align_error(&e))?;
        let line = serde_json::to_string(&response).map_err(|e| (1, e.to_string()))?;
        writeln!(stdout.lock(), "{line}").map_err(|e| (1, e.to_string()))?;
    }

    let summary = engine.guard_summary();
    info!(
        total_foods,
        accepted = summary.total_accepted,
        stage_z_used = summary.stage_z_used,
        macro_rejected = summary.macro_guards_rejected,
        "batch complete"
    );

    // Hard assertion: a large input with configured fallbacks that never
    // touched Stage Z points at a broken cascade, not a clean run.
    let fallbacks_configured = !configs.branded_fallbacks().entries.is_empty();
    if total_foods >= STAGE_Z_ASSERTION_MIN_FOODS
        && fallbacks_configured
        && summary.stage_z_used == 0
    {
        return Err((
            EXIT_ASSERTION,
            format!("stage Z usage is 0 across {total_foods} foods with fallbacks configured"),
        ));
    }

    Ok(0)
}

fn classify_align_error(err: &AlignError) -> (u8, String) {
    if err.is_database_unavailable() {
        (EXIT_DATABASE, err.to_string())
    } else if matches!(err, AlignError::Config(_)) {
        (EXIT_CONFIG, err.to_string())
    } else {
        (1, err.to_string())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => ExitCode::from(code),
        Err((code, message)) => {
            error!(%message, exit = code, "batch run failed");
            ExitCode::from(code)
        }
    }
}

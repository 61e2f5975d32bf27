//! End-to-end alignment scenarios against the shipped configuration set.
//!
//! These tests load the real `config/` directory and drive the full engine
//! over a reference NDB fixture whose identifiers line up with the pinned
//! fallback and recipe entries in that configuration.

use std::sync::Arc;

use foodalign::{
    align_image, AlignmentEngine, AlignmentRequest, AlignmentStage, ConfigSnapshot, FoodEntry,
    FoodQuery, FormTag, MemoryNdb, Nutrients, SourceTag,
};

fn config_dir() -> String {
    format!("{}/config", env!("CARGO_MANIFEST_DIR"))
}

fn entry(
    fdc_id: i64,
    name: &str,
    source: SourceTag,
    form: FormTag,
    kcal: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
) -> FoodEntry {
    FoodEntry {
        fdc_id,
        name: name.to_string(),
        source,
        form,
        nutrients: Nutrients {
            energy_kcal: kcal,
            protein_g: protein,
            carbs_g: carbs,
            fat_g: fat,
            micros: None,
        },
    }
}

fn reference_ndb(with_sprout_seed: bool) -> MemoryNdb {
    let mut ndb = MemoryNdb::new();
    ndb.insert(entry(1001, "Grapes, raw", SourceTag::Foundation, FormTag::Raw, 67.0, 0.6, 17.2, 0.3));
    ndb.insert(entry(1002, "Grape juice, canned", SourceTag::Legacy, FormTag::Unknown, 60.0, 0.4, 14.8, 0.1));
    ndb.insert(entry(
        2001,
        "Olives, ripe, canned (small-extra large)",
        SourceTag::Foundation,
        FormTag::Raw,
        115.0,
        0.8,
        6.0,
        10.7,
    ));
    ndb.insert(entry(2002, "Oil, olive, salad or cooking", SourceTag::Legacy, FormTag::Unknown, 884.0, 0.0, 0.0, 100.0));
    ndb.insert(entry(3001, "Egg, whole, raw, fresh", SourceTag::Foundation, FormTag::Raw, 143.0, 12.6, 0.7, 9.5));
    ndb.insert(entry(3002, "Egg, whole, dried", SourceTag::Foundation, FormTag::Raw, 143.0, 12.0, 1.0, 9.0));
    ndb.insert(entry(3004, "Bread, egg, toasted", SourceTag::Legacy, FormTag::Unknown, 315.0, 10.9, 56.0, 5.0));
    ndb.insert(entry(13001, "Egg, white, raw, fresh", SourceTag::Foundation, FormTag::Raw, 52.0, 10.9, 0.7, 0.2));
    if with_sprout_seed {
        ndb.insert(entry(4001, "Brussels sprouts, raw", SourceTag::Foundation, FormTag::Raw, 43.0, 3.4, 9.0, 0.3));
    }
    // Pinned Stage Z entries from config/branded_fallbacks.yml.
    ndb.insert(entry(
        2345001,
        "Brussels sprouts, oven roasted",
        SourceTag::Branded,
        FormTag::Cooked,
        45.0,
        3.0,
        8.0,
        1.5,
    ));
    ndb.insert(entry(2345005, "Egg white, liquid", SourceTag::Branded, FormTag::Raw, 50.0, 10.5, 0.7, 0.2));
    // Pinned recipe components from config/recipes/cheese_pizza.yml.
    ndb.insert(entry(9101, "Bread, pizza crust, baked", SourceTag::Legacy, FormTag::Cooked, 270.0, 9.0, 50.0, 3.5));
    ndb.insert(entry(9102, "Cheese, mozzarella, whole milk", SourceTag::Foundation, FormTag::Unknown, 300.0, 22.0, 2.2, 22.4));
    ndb.insert(entry(9103, "Sauce, pizza, canned", SourceTag::Legacy, FormTag::Unknown, 54.0, 1.8, 10.1, 1.0));
    ndb.insert(entry(9104, "Oil, olive, salad or cooking", SourceTag::Legacy, FormTag::Unknown, 884.0, 0.0, 0.0, 100.0));
    // Boundary-case entries.
    ndb.insert(entry(11001, "Cucumber, with peel, raw", SourceTag::Foundation, FormTag::Raw, 15.0, 0.7, 3.6, 0.1));
    ndb.insert(entry(11002, "Sea cucumber, yane", SourceTag::Legacy, FormTag::Unknown, 56.0, 13.0, 0.0, 0.4));
    ndb.insert(entry(12001, "Sweet potato, raw", SourceTag::Foundation, FormTag::Raw, 86.0, 1.6, 20.1, 0.1));
    ndb.insert(entry(12002, "Potatoes, flesh and skin, raw", SourceTag::Foundation, FormTag::Raw, 77.0, 2.0, 17.5, 0.1));
    ndb
}

fn engine(with_sprout_seed: bool) -> AlignmentEngine<MemoryNdb> {
    let configs = Arc::new(ConfigSnapshot::load_dir(config_dir()).expect("shipped config loads"));
    AlignmentEngine::new(reference_ndb(with_sprout_seed), configs).expect("engine constructs")
}

fn query(name: &str, form: Option<&str>, mass_g: Option<f64>) -> FoodQuery {
    FoodQuery {
        name: name.to_string(),
        form: form.map(str::to_string),
        mass_g,
        confidence: Some(0.9),
        modifiers: Vec::new(),
    }
}

#[test]
fn scenario_grape_raw_stage1b() {
    let mut engine = engine(true);
    let result = engine
        .align_food("scenario-1", 0, &query("grape", Some("raw"), Some(100.0)))
        .unwrap();

    assert!(result.available);
    assert_eq!(result.stage, Some(AlignmentStage::Stage1b));
    assert_eq!(result.matched_name.as_deref(), Some("Grapes, raw"));
    let kcal = result.telemetry.matched_energy_per_100g.unwrap();
    assert!((kcal - 67.0).abs() < 1.0);
    assert!(!result.telemetry.conversion_applied);
}

#[test]
fn scenario_olives_guardrail_rejects_oil() {
    let mut engine = engine(true);
    let result = engine
        .align_food("scenario-2", 0, &query("olives", Some("raw"), Some(50.0)))
        .unwrap();

    assert!(result.available);
    assert_eq!(result.stage, Some(AlignmentStage::Stage1b));
    assert_eq!(result.fdc_id, Some(2001));
    assert!(result.telemetry.guardrail_produce_applied);
    let name = result.matched_name.unwrap().to_lowercase();
    assert!(!name.contains("oil"));
}

#[test]
fn scenario_eggs_stage1c_switch() {
    let mut engine = engine(true);
    let result = engine
        .align_food("scenario-3", 0, &query("eggs", Some("raw"), Some(60.0)))
        .unwrap();

    assert!(result.available);
    assert_eq!(result.stage, Some(AlignmentStage::Stage1c));
    assert_eq!(result.matched_name.as_deref(), Some("Egg, whole, raw, fresh"));
    let switch = result.telemetry.stage1c_switched.as_ref().unwrap();
    assert_eq!(switch.to_id, 3001);
    assert_eq!(switch.from_id, 3002);
    // The winner carries a raw synonym and no processed penalty term.
    let to = switch.to.to_lowercase();
    assert!(to.contains("raw") || to.contains("fresh"));
    assert!(!to.contains("dried"));
}

#[test]
fn scenario_roasted_sprouts_stage2_with_seed() {
    let mut engine = engine(true);
    let result = engine
        .align_food(
            "scenario-4",
            0,
            &query("brussels sprouts", Some("roasted"), Some(90.0)),
        )
        .unwrap();

    assert!(result.available);
    assert_eq!(result.stage, Some(AlignmentStage::Stage2));
    assert!(result.telemetry.conversion_applied);
    let attempted = &result.telemetry.attempted_stages;
    assert!(attempted.contains(&"stage1c".to_string()));
    assert!(attempted.contains(&"stage2".to_string()));
    // Stage 2's seed is the raw foundation entry.
    assert_eq!(result.fdc_id, Some(4001));
    // 90 g raw shrinks by the configured 20 %.
    assert!((result.mass_g.unwrap() - 72.0).abs() < 1e-9);
}

#[test]
fn scenario_roasted_sprouts_stage_z_without_seed() {
    let mut engine = engine(false);
    let result = engine
        .align_food(
            "scenario-4b",
            0,
            &query("brussels sprouts", Some("roasted"), Some(90.0)),
        )
        .unwrap();

    assert!(result.available);
    assert_eq!(result.stage, Some(AlignmentStage::StageZBrandedFallback));
    let record = result.telemetry.stage_z.as_ref().unwrap();
    assert_eq!(record.key, "brussels_sprouts_roasted");
    let kcal = result.telemetry.matched_energy_per_100g.unwrap();
    assert!((25.0..=65.0).contains(&kcal));
    let attempted = &result.telemetry.attempted_stages;
    assert!(attempted.contains(&"stage2".to_string()));
    assert!(attempted.contains(&"stageZ_branded_fallback".to_string()));
}

#[test]
fn scenario_cheese_pizza_decomposition() {
    let mut engine = engine(true);
    let result = engine
        .align_food("scenario-5", 0, &query("cheese pizza", Some("cooked"), Some(300.0)))
        .unwrap();

    assert!(result.available);
    assert_eq!(result.stage, Some(AlignmentStage::Stage5c));
    assert_eq!(result.telemetry.recipe_template.as_deref(), Some("cheese_pizza"));
    assert_eq!(result.expanded_foods.len(), 4);

    let masses: Vec<f64> = result
        .expanded_foods
        .iter()
        .map(|c| c.mass_g.unwrap())
        .collect();
    assert_eq!(masses, vec![150.0, 90.0, 45.0, 15.0]);
    for child in &result.expanded_foods {
        assert!(child.stage.is_some(), "every child carries its own stage");
    }
    let aligned = result.expanded_foods.iter().filter(|c| c.available).count();
    assert!(aligned * 2 >= result.expanded_foods.len());
}

#[test]
fn scenario_white_wine_is_ignored() {
    let mut engine = engine(true);
    let result = engine
        .align_food("scenario-6", 0, &query("white wine", None, Some(150.0)))
        .unwrap();

    assert!(!result.available);
    assert_eq!(result.stage, None);
    assert_eq!(result.ignored_class.as_deref(), Some("alcoholic_beverage"));
    assert_eq!(result.telemetry.alignment_stage, "ignored");
    assert!(result.telemetry.attempted_stages.is_empty());
}

#[test]
fn boundary_sea_cucumber_is_blocked_for_cucumber() {
    let mut engine = engine(true);
    let result = engine
        .align_food("boundary-1", 0, &query("cucumber", Some("raw"), Some(80.0)))
        .unwrap();

    assert!(result.available);
    assert_eq!(result.fdc_id, Some(11001));
    assert!(result.telemetry.guardrail_rejections >= 1);
}

#[test]
fn boundary_sweet_potato_compound_is_preserved() {
    let mut engine = engine(true);
    let sweet = engine
        .align_food("boundary-2", 0, &query("sweet potato", Some("raw"), Some(130.0)))
        .unwrap();
    assert_eq!(sweet.fdc_id, Some(12001));

    let plain = engine
        .align_food("boundary-2", 1, &query("potato", Some("raw"), Some(130.0)))
        .unwrap();
    assert_eq!(plain.fdc_id, Some(12002));
}

#[test]
fn boundary_egg_white_omelet_infers_cooked_form() {
    let mut engine = engine(true);
    let result = engine
        .align_food("boundary-3", 0, &query("egg white omelet", None, Some(100.0)))
        .unwrap();

    assert_eq!(
        result.telemetry.form_intent,
        Some(foodalign::FormIntent::Cooked)
    );
    assert!(result.available);
    assert_eq!(result.stage, Some(AlignmentStage::Stage2));
    assert_eq!(result.fdc_id, Some(13001));
    let steps = result.conversion.as_ref().unwrap();
    assert_eq!(steps.method, "scrambled");
}

#[test]
fn boundary_chilaquiles_note_survives_to_telemetry() {
    let mut engine = engine(true);
    let result = engine
        .align_food("boundary-4", 0, &query("chilaquiles", None, Some(200.0)))
        .unwrap();
    assert!(result
        .telemetry
        .low_confidence_note
        .as_deref()
        .unwrap()
        .contains("chilaquiles"));
}

#[test]
fn align_image_round_trip_with_fingerprint() {
    let mut engine = engine(true);
    let fingerprint = engine.config_fingerprint().to_string();
    let request = AlignmentRequest {
        image_id: "img-batch".into(),
        foods: vec![
            query("grape", Some("raw"), Some(100.0)),
            query("white wine", None, Some(150.0)),
            query("cheese pizza", Some("cooked"), Some(300.0)),
        ],
        config_fingerprint: Some(fingerprint.clone()),
    };

    let response = align_image(&mut engine, &request, None).unwrap();
    assert_eq!(response.image_id, "img-batch");
    assert_eq!(response.foods.len(), 3);
    assert_eq!(response.config_version, fingerprint);
    assert!(!response.ndb_snapshot.is_empty());
    assert!(!response.code_revision.is_empty());
}

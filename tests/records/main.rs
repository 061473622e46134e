#[path = "../fixtures/synthea.rs"]
mod synthea;

use encounter_docgen::{
    dataset::{Dataset, EncounterRecords, EncounterSelector, Table, select_encounter},
    error::PipelineErrorKind,
    records::{Category, CategoryRecords},
};

fn scope(encounter_id: &str) -> EncounterRecords {
    let dataset = synthea::dataset();
    let encounter = select_encounter(
        &dataset,
        &EncounterSelector::Explicit(encounter_id.to_string()),
    )
    .expect("encounter exists");
    EncounterRecords::gather(&dataset, encounter).expect("scope builds")
}

#[test]
fn loads_every_csv_in_the_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    synthea::write_dir(dir.path());
    std::fs::write(dir.path().join("notes.txt"), "ignored").expect("stray file");

    let dataset = Dataset::load(dir.path()).expect("dataset loads");
    let names: Vec<&str> = dataset.table_names().collect();
    assert_eq!(
        names,
        vec![
            "conditions",
            "encounters",
            "medications",
            "observations",
            "patients"
        ]
    );
    assert_eq!(
        dataset.table("encounters").map(|table| table.rows().len()),
        Some(3)
    );
}

#[test]
fn record_construction_is_deterministic() {
    let first = scope("E1");
    let second = scope("E1");
    assert_eq!(first.encounter(), second.encounter());
    assert_eq!(first.patient(), second.patient());
    assert_eq!(
        first.category(Category::Observations),
        second.category(Category::Observations)
    );
}

#[test]
fn blank_optionals_map_to_none() {
    let records = scope("E2");
    assert_eq!(records.encounter().reasoncode, None);
    assert_eq!(records.encounter().reasondescription, None);
    assert_eq!(records.patient().zip, None);
    assert_eq!(records.patient().drivers, None);
    assert!(records.patient().is_alive());

    let Some(CategoryRecords::Conditions(conditions)) = records.category(Category::Conditions)
    else {
        panic!("E2 has one condition");
    };
    assert_eq!(conditions[0].stop, None);
}

#[test]
fn scope_keeps_only_records_linked_to_the_encounter() {
    let records = scope("E1");
    assert_eq!(
        records.present_categories(),
        vec![
            Category::Observations,
            Category::Medications,
            Category::Conditions
        ]
    );
    assert_eq!(
        records
            .category(Category::Observations)
            .map(CategoryRecords::len),
        Some(3)
    );
    assert!(
        records
            .categories()
            .flat_map(|category| category.links())
            .all(|(patient, encounter)| patient == "P1" && encounter == Some("E1"))
    );
    assert_eq!(records.patient().zip.as_deref(), Some("02118"));
    assert_eq!(records.encounter().reasoncode.as_deref(), Some("10509002"));
}

#[test]
fn encounter_without_linked_records_has_no_categories() {
    let records = scope("E3");
    assert!(records.present_categories().is_empty());
    assert!(records.category(Category::Devices).is_none());
}

#[test]
fn clinical_terms_are_distinct_and_scoped() {
    let records = scope("E1");
    assert_eq!(
        records.clinical_terms(),
        vec![
            "Acetaminophen 325 MG Oral Tablet".to_string(),
            "Acute bronchitis (disorder)".to_string(),
        ]
    );
    assert!(scope("E3").clinical_terms().is_empty());
}

#[test]
fn same_seed_selects_same_encounter() {
    let dataset = synthea::dataset();
    let first = select_encounter(&dataset, &EncounterSelector::Seeded(313)).expect("selected");
    let second = select_encounter(&dataset, &EncounterSelector::Seeded(313)).expect("selected");
    assert_eq!(first.id, second.id);
}

#[test]
fn unknown_encounter_is_a_lookup_error() {
    let err = select_encounter(
        &synthea::dataset(),
        &EncounterSelector::Explicit("E404".to_string()),
    )
    .expect_err("unknown id");
    assert_eq!(err.kind, PipelineErrorKind::Lookup);
}

#[test]
fn missing_patient_row_is_a_lookup_error() {
    let mut dataset = synthea::dataset();
    let header_only = synthea::PATIENTS_CSV.lines().next().unwrap_or_default();
    dataset.insert(
        Table::from_reader("patients", header_only.as_bytes()).expect("header-only table"),
    );
    let encounter = select_encounter(&dataset, &EncounterSelector::Explicit("E1".to_string()))
        .expect("encounter exists");

    let err = EncounterRecords::gather(&dataset, encounter).expect_err("patient missing");
    assert_eq!(err.kind, PipelineErrorKind::Lookup);
}

#[test]
fn non_numeric_cost_is_a_type_mismatch() {
    let mut dataset = synthea::dataset();
    let broken = synthea::MEDICATIONS_CSV.replace(",8.14,0.00,", ",eight,0.00,");
    dataset.insert(Table::from_reader("medications", broken.as_bytes()).expect("table parses"));
    let encounter = select_encounter(&dataset, &EncounterSelector::Explicit("E1".to_string()))
        .expect("encounter exists");

    let err = EncounterRecords::gather(&dataset, encounter).expect_err("bad cost");
    assert_eq!(err.kind, PipelineErrorKind::TypeMismatch);
}

#[test]
fn malformed_date_is_a_data_integrity_error() {
    let mut dataset = synthea::dataset();
    let broken = synthea::CONDITIONS_CSV.replace("2019-02-16,2019-03-02", "02/16/2019,");
    dataset.insert(Table::from_reader("conditions", broken.as_bytes()).expect("table parses"));
    let encounter = select_encounter(&dataset, &EncounterSelector::Explicit("E1".to_string()))
        .expect("encounter exists");

    let err = EncounterRecords::gather(&dataset, encounter).expect_err("bad date");
    assert_eq!(err.kind, PipelineErrorKind::DataIntegrity);
}

#[test]
fn category_records_render_as_prompt_json() {
    let records = scope("E1");
    let json = records
        .category(Category::Medications)
        .expect("medications present")
        .to_prompt_json()
        .expect("serializable");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value[0]["code"], 313782);
    assert_eq!(value[0]["dispenses"], 1);
}

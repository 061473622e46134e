use std::{fs, sync::Arc};

use encounter_docgen::{
    dataset::{Dataset, EncounterSelector, Table},
    error::PipelineErrorKind,
    narrative::{Narrative, PipelineSettings, PipelineStage, telemetry::PipelineTelemetryEvent},
    records::Category,
};

use crate::{
    scripted::{ScriptedEngine, pipeline, predicted},
    synthea,
};

fn explicit(id: &str) -> EncounterSelector {
    EncounterSelector::Explicit(id.to_string())
}

/// The fixture without its conditions table, so `E1` carries only
/// observations and medications.
fn observations_and_medications_only() -> Dataset {
    Dataset::from_tables(
        synthea::TABLES
            .iter()
            .filter(|(name, _)| *name != "conditions")
            .map(|(name, csv)| {
                Table::from_reader(*name, csv.as_bytes()).expect("fixture table parses")
            }),
    )
}

async fn assert_fuser_sees_two_categories(settings: PipelineSettings) {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(ScriptedEngine::new(vec![predicted("Progress Note")]));
    let (pipeline, sink) = pipeline(&engine, settings, output.path());

    let run = pipeline
        .run(&observations_and_medications_only(), &explicit("E1"))
        .await
        .expect("run succeeds");
    assert_eq!(
        run.summarized_categories,
        vec![Category::Observations, Category::Medications]
    );

    let fusions = engine.fusion_requests.lock().expect("lock");
    assert_eq!(fusions.len(), 1);
    let fusion = &fusions[0];
    assert_eq!(
        fusion.patient_narrative,
        Narrative::new("Jose Rivera is a patient.")
    );
    assert_eq!(fusion.category_narratives.len(), 2);
    assert_eq!(
        fusion.category_narratives.get(Category::Observations),
        Some(&Narrative::new("observations narrative"))
    );
    for category in Category::ALL {
        let expected_absent =
            !matches!(category, Category::Observations | Category::Medications);
        assert_eq!(
            fusion.category_narratives.is_absent(category),
            expected_absent,
            "{category}"
        );
    }

    assert_eq!(engine.summary_requests.lock().expect("lock").len(), 2);
    let skipped = sink
        .events
        .lock()
        .expect("lock")
        .iter()
        .filter(|event| matches!(event, PipelineTelemetryEvent::CategorySkipped { .. }))
        .count();
    assert_eq!(skipped, 6);
}

#[tokio::test]
async fn fuser_receives_only_present_categories_plus_patient() {
    assert_fuser_sees_two_categories(PipelineSettings::default()).await;
}

#[tokio::test]
async fn sequential_summaries_feed_the_fuser_identically() {
    assert_fuser_sees_two_categories(PipelineSettings {
        concurrent_summaries: false,
        ..PipelineSettings::default()
    })
    .await;
}

#[tokio::test]
async fn unknown_encounter_aborts_before_any_reasoning_call() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(ScriptedEngine::new(vec![predicted("Progress Note")]));
    let (pipeline, sink) = pipeline(&engine, PipelineSettings::default(), output.path());

    let err = pipeline
        .run(&synthea::dataset(), &explicit("E404"))
        .await
        .expect_err("unknown encounter");

    assert_eq!(err.kind, PipelineErrorKind::Lookup);
    assert_eq!(engine.reasoning_calls(), 0);
    assert_eq!(
        fs::read_dir(output.path()).expect("output root").count(),
        0,
        "nothing may be written"
    );
    assert!(matches!(
        sink.events.lock().expect("lock").last(),
        Some(PipelineTelemetryEvent::RunFailed {
            encounter_id: None,
            stage: PipelineStage::SelectEncounter,
            error_kind: PipelineErrorKind::Lookup,
        })
    ));
}

#[tokio::test]
async fn empty_prediction_skips_synthesis_and_refinement() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(ScriptedEngine::new(Vec::new()));
    let (pipeline, sink) = pipeline(&engine, PipelineSettings::default(), output.path());

    let run = pipeline
        .run(&synthea::dataset(), &explicit("E1"))
        .await
        .expect("run completes");

    assert_eq!(run.predicted_documents, 0);
    assert!(run.documents.is_empty());
    assert_eq!(run.run_dir, None);
    assert!(engine.writer_requests.lock().expect("lock").is_empty());
    assert!(engine.oracle_requests.lock().expect("lock").is_empty());
    assert!(engine.refinement_requests.lock().expect("lock").is_empty());
    assert!(!output.path().join("E1").exists());
    assert!(matches!(
        sink.events.lock().expect("lock").last(),
        Some(PipelineTelemetryEvent::RunCompleted { documents: 0, .. })
    ));
}

#[tokio::test]
async fn consecutive_runs_land_in_sibling_variants() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(ScriptedEngine::new(vec![predicted("Progress Note")]));
    let (pipeline, _sink) = pipeline(&engine, PipelineSettings::default(), output.path());
    let dataset = synthea::dataset();

    let first = pipeline
        .run(&dataset, &explicit("E1"))
        .await
        .expect("first run");
    let second = pipeline
        .run(&dataset, &explicit("E1"))
        .await
        .expect("second run");

    assert_eq!(first.run_dir, Some(output.path().join("E1").join("0")));
    assert_eq!(second.run_dir, Some(output.path().join("E1").join("1")));
    assert_eq!(second.variant, Some(1));
    assert!(output.path().join("E1/0/0.txt").exists());
    assert!(output.path().join("E1/1/0.txt").exists());
}

#[tokio::test]
async fn blank_deathdate_reaches_the_narrator_as_living_patient() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(ScriptedEngine::new(Vec::new()));
    let (pipeline, _sink) = pipeline(&engine, PipelineSettings::default(), output.path());

    pipeline
        .run(&synthea::dataset(), &explicit("E1"))
        .await
        .expect("run completes");

    let requests = engine.patient_requests.lock().expect("lock");
    assert_eq!(requests[0].patient.id, "P1");
    assert_eq!(requests[0].patient.deathdate, None);
    assert!(requests[0].patient.is_alive());
}

#[tokio::test]
async fn seeded_selection_is_reproducible_across_runs() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(ScriptedEngine::new(Vec::new()));
    let (pipeline, _sink) = pipeline(&engine, PipelineSettings::default(), output.path());
    let dataset = synthea::dataset();

    let first = pipeline
        .run(&dataset, &EncounterSelector::Seeded(313))
        .await
        .expect("first run");
    let second = pipeline
        .run(&dataset, &EncounterSelector::Seeded(313))
        .await
        .expect("second run");
    assert_eq!(first.encounter_id, second.encounter_id);
}

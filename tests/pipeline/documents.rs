use std::{fs, sync::Arc};

use encounter_docgen::{
    dataset::EncounterSelector,
    error::PipelineErrorKind,
    narrative::{
        FactDriftPolicy, KeptText, Narrative, PipelineSettings, PipelineStage,
        telemetry::{JsonlTelemetrySink, PipelineTelemetryEvent},
    },
    output::{MANIFEST_FILE, OutputStore},
};

use crate::{
    scripted::{
        RefinerBehaviour, ScriptedEngine, WRITER_QUESTION, draft_for, pipeline, predicted,
    },
    synthea,
};

fn e1() -> EncounterSelector {
    EncounterSelector::Explicit("E1".to_string())
}

fn engine_with(
    documents: &[&str],
    configure: impl FnOnce(&mut ScriptedEngine),
) -> Arc<ScriptedEngine> {
    let mut engine = ScriptedEngine::new(documents.iter().map(|doc| predicted(doc)).collect());
    configure(&mut engine);
    Arc::new(engine)
}

#[tokio::test]
async fn documents_are_persisted_in_prediction_order() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = engine_with(&["Progress Note", "Discharge Summary"], |_| {});
    let (pipeline, sink) = pipeline(&engine, PipelineSettings::default(), output.path());

    let run = pipeline.run(&synthea::dataset(), &e1()).await.expect("run");

    assert_eq!(run.documents.len(), 2);
    assert_eq!(run.documents[0].document_type, "Progress Note");
    assert_eq!(run.documents[1].index, 1);
    let second = fs::read_to_string(output.path().join("E1/0/1.txt")).expect("second document");
    assert!(second.starts_with("DISCHARGE SUMMARY"));
    assert!(second.ends_with("Electronically signed."));

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(output.path().join("E1/0").join(MANIFEST_FILE)).expect("manifest"),
    )
    .expect("manifest json");
    assert_eq!(manifest["documents"][0]["document_type"], "Progress Note");
    assert_eq!(
        manifest["documents"][1]["applied_transformations"][0],
        "Added signature"
    );

    let persisted = sink
        .events
        .lock()
        .expect("lock")
        .iter()
        .filter(|event| matches!(event, PipelineTelemetryEvent::DocumentPersisted { .. }))
        .count();
    assert_eq!(persisted, 2);
}

#[tokio::test]
async fn oracle_sees_encounter_patient_then_category_narratives() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = engine_with(&["Progress Note"], |engine| engine.writer_asks_first = true);
    let (pipeline, _sink) = pipeline(&engine, PipelineSettings::default(), output.path());

    pipeline.run(&synthea::dataset(), &e1()).await.expect("run");

    let oracle = engine.oracle_requests.lock().expect("lock");
    assert_eq!(oracle.len(), 1);
    assert_eq!(oracle[0].question, WRITER_QUESTION);
    assert_eq!(
        oracle[0].narratives,
        vec![
            Narrative::new("encounter narrative"),
            Narrative::new("Jose Rivera is a patient."),
            Narrative::new("observations narrative"),
            Narrative::new("medications narrative"),
            Narrative::new("conditions narrative"),
        ]
    );

    let writer = engine.writer_requests.lock().expect("lock");
    assert_eq!(writer.len(), 2);
    assert_eq!(writer[1].transcript[0].answer, "142/91 mmHg");
}

#[tokio::test]
async fn style_profile_is_forwarded_to_the_refiner() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = engine_with(&["Progress Note"], |_| {});
    let settings = PipelineSettings {
        facility_style_profile: Some("Community hospital, terse SOAP notes".to_string()),
        ..PipelineSettings::default()
    };
    let (pipeline, _sink) = pipeline(&engine, settings, output.path());

    pipeline.run(&synthea::dataset(), &e1()).await.expect("run");

    let requests = engine.refinement_requests.lock().expect("lock");
    assert_eq!(
        requests[0].facility_style_profile.as_deref(),
        Some("Community hospital, terse SOAP notes")
    );
    assert_eq!(requests[0].document.content, draft_for("Progress Note"));
}

#[tokio::test]
async fn fact_drift_keeps_the_synthesized_text_by_default() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = engine_with(&["Progress Note"], |engine| {
        engine.refiner = RefinerBehaviour::Drifting
    });
    let (pipeline, _sink) = pipeline(&engine, PipelineSettings::default(), output.path());

    let run = pipeline.run(&synthea::dataset(), &e1()).await.expect("run");

    assert_eq!(run.documents[0].kept, KeptText::Original);
    let written = fs::read_to_string(&run.documents[0].path).expect("document");
    assert_eq!(written, draft_for("Progress Note"));
}

#[tokio::test]
async fn fact_drift_can_fail_the_run() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = engine_with(&["Progress Note"], |engine| {
        engine.refiner = RefinerBehaviour::Drifting
    });
    let settings = PipelineSettings {
        on_fact_drift: FactDriftPolicy::Fail,
        ..PipelineSettings::default()
    };
    let (pipeline, sink) = pipeline(&engine, settings, output.path());

    let err = pipeline
        .run(&synthea::dataset(), &e1())
        .await
        .expect_err("drift fails");
    assert_eq!(err.kind, PipelineErrorKind::ReasoningEngine);
    assert!(err.message.contains("142"), "{err}");
    assert!(!output.path().join("E1/0/0.txt").exists());
    assert!(matches!(
        sink.events.lock().expect("lock").last(),
        Some(PipelineTelemetryEvent::RunFailed {
            stage: PipelineStage::Refine,
            ..
        })
    ));
}

#[tokio::test]
async fn swapped_drug_name_is_fact_drift() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = engine_with(&["Progress Note"], |engine| {
        engine.refiner = RefinerBehaviour::SwapsDrug
    });
    let settings = PipelineSettings {
        on_fact_drift: FactDriftPolicy::Fail,
        ..PipelineSettings::default()
    };
    let (pipeline, _sink) = pipeline(&engine, settings, output.path());

    let err = pipeline
        .run(&synthea::dataset(), &e1())
        .await
        .expect_err("swapped drug fails");
    assert_eq!(err.kind, PipelineErrorKind::ReasoningEngine);
    assert!(err.message.contains("acetaminophen"), "{err}");
    assert!(!err.message.contains("acute bronchitis"), "{err}");

    let requests = engine.refinement_requests.lock().expect("lock");
    assert_eq!(
        requests[0].clinical_terms,
        vec![
            "Acetaminophen 325 MG Oral Tablet".to_string(),
            "Acute bronchitis (disorder)".to_string(),
        ]
    );
}

#[tokio::test]
async fn failure_keeps_documents_already_written() {
    let output = tempfile::tempdir().expect("tempdir");
    let engine = engine_with(&["Progress Note", "Discharge Summary"], |engine| {
        engine.failing_writer_document = Some("Discharge Summary".to_string())
    });
    let (pipeline, sink) = pipeline(&engine, PipelineSettings::default(), output.path());

    let err = pipeline
        .run(&synthea::dataset(), &e1())
        .await
        .expect_err("writer fails");
    assert_eq!(err.kind, PipelineErrorKind::ReasoningEngine);
    assert!(output.path().join("E1/0/0.txt").exists());
    assert!(!output.path().join("E1/0/1.txt").exists());
    assert!(matches!(
        sink.events.lock().expect("lock").last(),
        Some(PipelineTelemetryEvent::RunFailed {
            stage: PipelineStage::Synthesize,
            ..
        })
    ));
}

#[tokio::test]
async fn jsonl_trace_records_the_whole_run() {
    let output = tempfile::tempdir().expect("tempdir");
    let trace_path = output.path().join("trace").join("run.jsonl");
    let engine = engine_with(&["Progress Note"], |_| {});
    let pipeline = encounter_docgen::narrative::EncounterPipeline::new(
        engine.ports(),
        PipelineSettings::default(),
        OutputStore::new(output.path().join("docs"), false),
        Arc::new(JsonlTelemetrySink::open(&trace_path).expect("trace opens")),
    );

    pipeline.run(&synthea::dataset(), &e1()).await.expect("run");

    let trace = fs::read_to_string(&trace_path).expect("trace written");
    let events: Vec<serde_json::Value> = trace
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(events[0]["stage"], "select_encounter");
    assert!(events[0]["at"].is_string());
    assert_eq!(
        events.last().map(|event| event["event"].clone()),
        Some(serde_json::Value::from("run_completed"))
    );
    assert!(
        events
            .iter()
            .any(|event| event["event"] == "document_persisted")
    );
    assert!(!output.path().join("docs/E1/0").join(MANIFEST_FILE).exists());
}

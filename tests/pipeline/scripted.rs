use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use encounter_docgen::{
    error::{PipelineError, reasoning_engine},
    narrative::{
        EncounterPipeline, Narrative, OracleAnswer, PipelinePorts, PipelineSettings,
        PredictedDocument, WriterStep,
        ports::{
            AuthenticityRefinerPort, CaseOraclePort, CategorySummarizerPort,
            CategorySummaryRequest, ContextFuserPort, DocumentPredictorPort, DocumentWriterPort,
            FusionRequest, OracleRequest, PatientNarrationRequest, PatientNarratorPort,
            PredictionRequest, RefinementRequest, WriterTurnRequest,
        },
        telemetry::{PipelineTelemetryEvent, PipelineTelemetrySink},
        types::RefinerOutput,
    },
    output::OutputStore,
};

pub const WRITER_QUESTION: &str = "What was the blood pressure?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinerBehaviour {
    /// Adds a signature line and keeps every number.
    Faithful,
    /// Rounds the systolic reading, dropping `142`.
    Drifting,
    /// Keeps every number but swaps the prescribed drug.
    SwapsDrug,
}

/// One recorder standing in for every reasoning stage.
pub struct ScriptedEngine {
    pub predictions: Vec<PredictedDocument>,
    pub writer_asks_first: bool,
    pub failing_writer_document: Option<String>,
    pub refiner: RefinerBehaviour,
    pub patient_requests: Mutex<Vec<PatientNarrationRequest>>,
    pub summary_requests: Mutex<Vec<CategorySummaryRequest>>,
    pub fusion_requests: Mutex<Vec<FusionRequest>>,
    pub prediction_requests: Mutex<Vec<PredictionRequest>>,
    pub writer_requests: Mutex<Vec<WriterTurnRequest>>,
    pub oracle_requests: Mutex<Vec<OracleRequest>>,
    pub refinement_requests: Mutex<Vec<RefinementRequest>>,
}

impl ScriptedEngine {
    pub fn new(predictions: Vec<PredictedDocument>) -> Self {
        Self {
            predictions,
            writer_asks_first: false,
            failing_writer_document: None,
            refiner: RefinerBehaviour::Faithful,
            patient_requests: Mutex::new(Vec::new()),
            summary_requests: Mutex::new(Vec::new()),
            fusion_requests: Mutex::new(Vec::new()),
            prediction_requests: Mutex::new(Vec::new()),
            writer_requests: Mutex::new(Vec::new()),
            oracle_requests: Mutex::new(Vec::new()),
            refinement_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reasoning_calls(&self) -> usize {
        self.patient_requests.lock().expect("lock").len()
            + self.summary_requests.lock().expect("lock").len()
            + self.fusion_requests.lock().expect("lock").len()
            + self.prediction_requests.lock().expect("lock").len()
            + self.writer_requests.lock().expect("lock").len()
            + self.oracle_requests.lock().expect("lock").len()
            + self.refinement_requests.lock().expect("lock").len()
    }

    pub fn ports(self: &Arc<Self>) -> PipelinePorts {
        PipelinePorts {
            patient_narrator: self.clone(),
            summarizer: self.clone(),
            fuser: self.clone(),
            predictor: self.clone(),
            writer: self.clone(),
            oracle: self.clone(),
            refiner: self.clone(),
        }
    }
}

pub fn predicted(document_type: &str) -> PredictedDocument {
    PredictedDocument {
        document_type: document_type.to_string(),
        description: format!("{document_type} for the visit"),
    }
}

pub fn draft_for(document_type: &str) -> String {
    format!(
        "{}\nBP 142/91 mmHg, temperature 38.2 C.\nAcute bronchitis. Acetaminophen 325 mg.",
        document_type.to_uppercase()
    )
}

#[async_trait]
impl PatientNarratorPort for ScriptedEngine {
    async fn narrate(&self, req: PatientNarrationRequest) -> Result<Narrative, PipelineError> {
        let text = format!("{} {} is a patient.", req.patient.first, req.patient.last);
        self.patient_requests.lock().expect("lock").push(req);
        Ok(Narrative::new(text))
    }
}

#[async_trait]
impl CategorySummarizerPort for ScriptedEngine {
    async fn summarize(&self, req: CategorySummaryRequest) -> Result<Narrative, PipelineError> {
        let text = format!("{} narrative", req.category().label());
        self.summary_requests.lock().expect("lock").push(req);
        Ok(Narrative::new(text))
    }
}

#[async_trait]
impl ContextFuserPort for ScriptedEngine {
    async fn fuse(&self, req: FusionRequest) -> Result<Narrative, PipelineError> {
        self.fusion_requests.lock().expect("lock").push(req);
        Ok(Narrative::new("encounter narrative"))
    }
}

#[async_trait]
impl DocumentPredictorPort for ScriptedEngine {
    async fn predict(
        &self,
        req: PredictionRequest,
    ) -> Result<Vec<PredictedDocument>, PipelineError> {
        self.prediction_requests.lock().expect("lock").push(req);
        Ok(self.predictions.clone())
    }
}

#[async_trait]
impl DocumentWriterPort for ScriptedEngine {
    async fn next_step(&self, req: WriterTurnRequest) -> Result<WriterStep, PipelineError> {
        let document_type = req.document.document_type.clone();
        let first_turn = req.transcript.is_empty();
        self.writer_requests.lock().expect("lock").push(req);

        if self.failing_writer_document.as_deref() == Some(document_type.as_str()) {
            return Err(reasoning_engine("writer backend unavailable"));
        }
        if self.writer_asks_first && first_turn {
            return Ok(WriterStep::Ask {
                question: WRITER_QUESTION.to_string(),
            });
        }
        Ok(WriterStep::Finish {
            document: draft_for(&document_type),
        })
    }
}

#[async_trait]
impl CaseOraclePort for ScriptedEngine {
    async fn answer(&self, req: OracleRequest) -> Result<OracleAnswer, PipelineError> {
        self.oracle_requests.lock().expect("lock").push(req);
        Ok(OracleAnswer::Answer("142/91 mmHg".to_string()))
    }
}

#[async_trait]
impl AuthenticityRefinerPort for ScriptedEngine {
    async fn refine(&self, req: RefinementRequest) -> Result<RefinerOutput, PipelineError> {
        let content = req.document.content.clone();
        self.refinement_requests.lock().expect("lock").push(req);
        let output = match self.refiner {
            RefinerBehaviour::Faithful => RefinerOutput {
                realistic_document: format!("{content}\nElectronically signed."),
                applied_transformations: vec!["Added signature".to_string()],
            },
            RefinerBehaviour::Drifting => RefinerOutput {
                realistic_document: content.replace("142", "140"),
                applied_transformations: vec!["Rounded vitals".to_string()],
            },
            RefinerBehaviour::SwapsDrug => RefinerOutput {
                realistic_document: content.replace("Acetaminophen", "Ibuprofen"),
                applied_transformations: vec!["Substituted brand".to_string()],
            },
        };
        Ok(output)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<PipelineTelemetryEvent>>,
}

impl PipelineTelemetrySink for RecordingSink {
    fn on_event(&self, event: PipelineTelemetryEvent) {
        self.events.lock().expect("lock").push(event);
    }
}

pub fn pipeline(
    engine: &Arc<ScriptedEngine>,
    settings: PipelineSettings,
    output_root: &Path,
) -> (EncounterPipeline, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let pipeline = EncounterPipeline::new(
        engine.ports(),
        settings,
        OutputStore::new(output_root, true),
        sink.clone(),
    );
    (pipeline, sink)
}

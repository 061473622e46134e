use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    ai_gateway::{
        gateway::AIGateway,
        types::{
            ChatMessage, ChatRequest, ChatResponse, FinishReason, OutputMode,
            RequestLimitOverrides,
        },
    },
    error::{PipelineError, reasoning_engine},
    narrative::{
        ports::{
            AuthenticityRefinerPort, CaseOraclePort, CategorySummarizerPort,
            CategorySummaryRequest, ContextFuserPort, DocumentPredictorPort, DocumentWriterPort,
            FusionRequest, OracleRequest, PatientNarrationRequest, PatientNarratorPort,
            PredictionRequest, RefinementRequest, WriterTurnRequest,
        },
        prompts,
        types::{Narrative, OracleAnswer, OracleMode, PredictedDocument, RefinerOutput, WriterStep},
    },
};

pub const PATIENT_NARRATOR_STAGE: &str = "patient_narrator";
pub const CATEGORY_SUMMARIZER_STAGE: &str = "category_summarizer";
pub const CONTEXT_FUSER_STAGE: &str = "context_fuser";
pub const DOCUMENT_PREDICTOR_STAGE: &str = "document_predictor";
pub const DOCUMENT_WRITER_STAGE: &str = "document_writer";
pub const CASE_ORACLE_STAGE: &str = "case_oracle";
pub const AUTHENTICITY_REFINER_STAGE: &str = "authenticity_refiner";

pub const STAGES: [&str; 7] = [
    PATIENT_NARRATOR_STAGE,
    CATEGORY_SUMMARIZER_STAGE,
    CONTEXT_FUSER_STAGE,
    DOCUMENT_PREDICTOR_STAGE,
    DOCUMENT_WRITER_STAGE,
    CASE_ORACLE_STAGE,
    AUTHENTICITY_REFINER_STAGE,
];

/// Sampling and routing parameters for one reasoning stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub backend_id: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: u64,
    pub max_request_time_ms: Option<u64>,
}

#[derive(Clone)]
struct StageClient {
    gateway: Arc<AIGateway>,
    params: GenerationParams,
    stage: &'static str,
    rejects_truncation: bool,
}

impl StageClient {
    fn new(gateway: Arc<AIGateway>, params: GenerationParams, stage: &'static str) -> Self {
        Self {
            gateway,
            params,
            stage,
            rejects_truncation: false,
        }
    }

    /// Stages whose output is persisted as a document fail on a reply cut
    /// off at `max_output_tokens` instead of saving half a note.
    fn rejecting_truncation(mut self) -> Self {
        self.rejects_truncation = true;
        self
    }

    async fn complete(
        &self,
        encounter_id: &str,
        system_prompt: String,
        user_prompt: String,
        output_mode: OutputMode,
    ) -> Result<String, PipelineError> {
        let request = build_text_request(
            &self.params,
            self.stage,
            encounter_id,
            system_prompt,
            user_prompt,
            output_mode,
        );
        let response = self
            .gateway
            .chat_once(request)
            .await
            .map_err(|err| reasoning_engine(format!("{} call failed: {}", self.stage, err)))?;

        finished_text(self.stage, response, self.rejects_truncation)
    }
}

fn finished_text(
    stage: &str,
    response: ChatResponse,
    rejects_truncation: bool,
) -> Result<String, PipelineError> {
    if response.finish_reason == FinishReason::Length {
        if rejects_truncation {
            return Err(reasoning_engine(format!(
                "{} output was truncated at the token limit",
                stage
            )));
        }
        tracing::warn!(
            target: "pipeline",
            stage = stage,
            request_id = %response.request_id,
            "stage_output_truncated"
        );
    }

    let text = response.output_text.trim().to_string();
    if text.is_empty() {
        return Err(reasoning_engine(format!("{} produced empty output", stage)));
    }
    Ok(text)
}

#[derive(Clone)]
pub struct AIGatewayPatientNarrator {
    client: StageClient,
}

#[derive(Clone)]
pub struct AIGatewayCategorySummarizer {
    client: StageClient,
}

#[derive(Clone)]
pub struct AIGatewayContextFuser {
    client: StageClient,
}

#[derive(Clone)]
pub struct AIGatewayDocumentPredictor {
    client: StageClient,
}

#[derive(Clone)]
pub struct AIGatewayDocumentWriter {
    client: StageClient,
}

#[derive(Clone)]
pub struct AIGatewayCaseOracle {
    client: StageClient,
    mode: OracleMode,
}

#[derive(Clone)]
pub struct AIGatewayAuthenticityRefiner {
    client: StageClient,
}

impl AIGatewayPatientNarrator {
    pub fn new(gateway: Arc<AIGateway>, params: GenerationParams) -> Self {
        Self {
            client: StageClient::new(gateway, params, PATIENT_NARRATOR_STAGE),
        }
    }
}

impl AIGatewayCategorySummarizer {
    pub fn new(gateway: Arc<AIGateway>, params: GenerationParams) -> Self {
        Self {
            client: StageClient::new(gateway, params, CATEGORY_SUMMARIZER_STAGE),
        }
    }
}

impl AIGatewayContextFuser {
    pub fn new(gateway: Arc<AIGateway>, params: GenerationParams) -> Self {
        Self {
            client: StageClient::new(gateway, params, CONTEXT_FUSER_STAGE),
        }
    }
}

impl AIGatewayDocumentPredictor {
    pub fn new(gateway: Arc<AIGateway>, params: GenerationParams) -> Self {
        Self {
            client: StageClient::new(gateway, params, DOCUMENT_PREDICTOR_STAGE),
        }
    }
}

impl AIGatewayDocumentWriter {
    pub fn new(gateway: Arc<AIGateway>, params: GenerationParams) -> Self {
        Self {
            client: StageClient::new(gateway, params, DOCUMENT_WRITER_STAGE)
                .rejecting_truncation(),
        }
    }
}

impl AIGatewayCaseOracle {
    pub fn new(gateway: Arc<AIGateway>, params: GenerationParams, mode: OracleMode) -> Self {
        Self {
            client: StageClient::new(gateway, params, CASE_ORACLE_STAGE),
            mode,
        }
    }
}

impl AIGatewayAuthenticityRefiner {
    pub fn new(gateway: Arc<AIGateway>, params: GenerationParams) -> Self {
        Self {
            client: StageClient::new(gateway, params, AUTHENTICITY_REFINER_STAGE)
                .rejecting_truncation(),
        }
    }
}

#[async_trait]
impl PatientNarratorPort for AIGatewayPatientNarrator {
    async fn narrate(&self, req: PatientNarrationRequest) -> Result<Narrative, PipelineError> {
        let patient_json = to_prompt_json(&req.patient, "patient profile")?;
        let text = self
            .client
            .complete(
                &req.encounter_id,
                prompts::patient_narrator_system_prompt(),
                prompts::build_patient_prompt(&patient_json),
                OutputMode::Text,
            )
            .await?;
        Ok(Narrative::new(text))
    }
}

#[async_trait]
impl CategorySummarizerPort for AIGatewayCategorySummarizer {
    async fn summarize(&self, req: CategorySummaryRequest) -> Result<Narrative, PipelineError> {
        let category = req.category();
        let records_json = req.records.to_prompt_json().map_err(|err| {
            reasoning_engine(format!("failed to encode {} for prompt: {}", category, err))
        })?;
        let text = self
            .client
            .complete(
                &req.encounter_id,
                prompts::category_summarizer_system_prompt(category),
                prompts::build_category_prompt(category, &records_json),
                OutputMode::Text,
            )
            .await?;
        Ok(Narrative::new(text))
    }
}

#[async_trait]
impl ContextFuserPort for AIGatewayContextFuser {
    async fn fuse(&self, req: FusionRequest) -> Result<Narrative, PipelineError> {
        let encounter_json = to_prompt_json(&req.encounter, "encounter profile")?;
        let text = self
            .client
            .complete(
                &req.encounter.id,
                prompts::fuser_system_prompt(),
                prompts::build_fusion_prompt(&req, &encounter_json),
                OutputMode::Text,
            )
            .await?;
        Ok(Narrative::new(text))
    }
}

#[derive(Debug, Deserialize)]
struct PredictionEnvelope {
    documents: Vec<PredictionEntry>,
}

#[derive(Debug, Deserialize)]
struct PredictionEntry {
    #[serde(rename = "type", default)]
    document_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl DocumentPredictorPort for AIGatewayDocumentPredictor {
    async fn predict(
        &self,
        req: PredictionRequest,
    ) -> Result<Vec<PredictedDocument>, PipelineError> {
        let text = self
            .client
            .complete(
                &req.encounter_id,
                prompts::predictor_system_prompt(),
                prompts::build_prediction_prompt(&req.encounter_narrative),
                OutputMode::JsonObject,
            )
            .await?;
        let envelope = parse_json_output::<PredictionEnvelope>(&text, DOCUMENT_PREDICTOR_STAGE)?;
        validate_predictions(envelope)
    }
}

fn validate_predictions(
    envelope: PredictionEnvelope,
) -> Result<Vec<PredictedDocument>, PipelineError> {
    envelope
        .documents
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let document_type = required_text(entry.document_type).ok_or_else(|| {
                reasoning_engine(format!("predicted document {} is missing 'type'", index))
            })?;
            let description = required_text(entry.description).ok_or_else(|| {
                reasoning_engine(format!(
                    "predicted document {} is missing 'description'",
                    index
                ))
            })?;
            Ok(PredictedDocument {
                document_type,
                description,
            })
        })
        .collect()
}

#[async_trait]
impl DocumentWriterPort for AIGatewayDocumentWriter {
    async fn next_step(&self, req: WriterTurnRequest) -> Result<WriterStep, PipelineError> {
        let text = self
            .client
            .complete(
                &req.encounter_id,
                prompts::writer_system_prompt(),
                prompts::build_writer_prompt(&req),
                OutputMode::JsonObject,
            )
            .await?;
        parse_json_output::<WriterStep>(&text, DOCUMENT_WRITER_STAGE)
    }
}

#[derive(Debug, Deserialize)]
struct StrictOracleEnvelope {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    insufficient_information: bool,
}

#[async_trait]
impl CaseOraclePort for AIGatewayCaseOracle {
    async fn answer(&self, req: OracleRequest) -> Result<OracleAnswer, PipelineError> {
        let output_mode = match self.mode {
            OracleMode::Fabricate => OutputMode::Text,
            OracleMode::Strict => OutputMode::JsonObject,
        };
        let text = self
            .client
            .complete(
                &req.encounter_id,
                prompts::oracle_system_prompt(self.mode),
                prompts::build_oracle_prompt(&req.question, &req.narratives),
                output_mode,
            )
            .await?;

        match self.mode {
            OracleMode::Fabricate => Ok(OracleAnswer::Answer(text)),
            OracleMode::Strict => {
                let envelope = parse_json_output::<StrictOracleEnvelope>(&text, CASE_ORACLE_STAGE)?;
                match required_text(envelope.answer) {
                    Some(answer) if !envelope.insufficient_information => {
                        Ok(OracleAnswer::Answer(answer))
                    }
                    _ => Ok(OracleAnswer::InsufficientInformation),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefinerEnvelope {
    #[serde(default)]
    realistic_document: Option<String>,
    #[serde(default)]
    applied_transformations: Vec<String>,
}

#[async_trait]
impl AuthenticityRefinerPort for AIGatewayAuthenticityRefiner {
    async fn refine(&self, req: RefinementRequest) -> Result<RefinerOutput, PipelineError> {
        let text = self
            .client
            .complete(
                &req.encounter_id,
                prompts::refiner_system_prompt(),
                prompts::build_refiner_prompt(
                    &req.document.document_type,
                    &req.document.content,
                    &req.clinical_terms,
                    req.facility_style_profile.as_deref(),
                ),
                OutputMode::JsonObject,
            )
            .await?;
        let envelope = parse_json_output::<RefinerEnvelope>(&text, AUTHENTICITY_REFINER_STAGE)?;
        let realistic_document = envelope
            .realistic_document
            .filter(|document| !document.trim().is_empty())
            .ok_or_else(|| reasoning_engine("refiner returned no 'realistic_document'"))?;
        Ok(RefinerOutput {
            realistic_document,
            applied_transformations: envelope
                .applied_transformations
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        })
    }
}

fn build_text_request(
    params: &GenerationParams,
    stage: &str,
    encounter_id: &str,
    system_prompt: String,
    user_prompt: String,
    output_mode: OutputMode,
) -> ChatRequest {
    let mut metadata = BTreeMap::new();
    metadata.insert("stage".to_string(), stage.to_string());
    metadata.insert("encounter_id".to_string(), encounter_id.to_string());
    ChatRequest {
        request_id: None,
        backend_id: params.backend_id.clone(),
        model: params.model.clone(),
        messages: vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ],
        output_mode,
        temperature: params.temperature,
        limits: RequestLimitOverrides {
            max_output_tokens: Some(params.max_output_tokens),
            max_request_time_ms: params.max_request_time_ms,
        },
        metadata,
    }
}

fn to_prompt_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| reasoning_engine(format!("failed to encode {} for prompt: {}", what, err)))
}

fn required_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn parse_json_output<T: for<'a> Deserialize<'a>>(
    text: &str,
    stage: &str,
) -> Result<T, PipelineError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(reasoning_engine(format!("{} returned empty JSON output", stage)));
    }

    let first_error = match serde_json::from_str::<T>(trimmed) {
        Ok(parsed) => return Ok(parsed),
        Err(err) => err,
    };

    if let Some(stripped) = strip_code_fence(trimmed) {
        if let Ok(parsed) = serde_json::from_str::<T>(&stripped) {
            return Ok(parsed);
        }
    }

    Err(reasoning_engine(format!(
        "{} returned malformed JSON output: {}",
        stage, first_error
    )))
}

fn strip_code_fence(text: &str) -> Option<String> {
    let text = text.trim();
    if !text.starts_with("```") {
        return None;
    }

    let mut lines = text.lines();
    let _first = lines.next()?;
    let mut body = Vec::new();
    for line in lines {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    Some(body.join("\n"))
}

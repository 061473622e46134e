use async_trait::async_trait;

use crate::{
    error::PipelineError,
    narrative::types::{
        CategoryNarratives, ClarificationExchange, GeneratedDocument, Narrative, OracleAnswer,
        PredictedDocument, RefinerOutput, WriterStep,
    },
    records::{Category, CategoryRecords, EncounterProfile, PatientProfile},
};

#[derive(Debug, Clone)]
pub struct CategorySummaryRequest {
    pub encounter_id: String,
    pub records: CategoryRecords,
}

impl CategorySummaryRequest {
    pub fn category(&self) -> Category {
        self.records.category()
    }
}

#[derive(Debug, Clone)]
pub struct PatientNarrationRequest {
    pub encounter_id: String,
    pub patient: PatientProfile,
}

#[derive(Debug, Clone)]
pub struct FusionRequest {
    pub encounter: EncounterProfile,
    pub patient_narrative: Narrative,
    pub category_narratives: CategoryNarratives,
}

#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub encounter_id: String,
    pub encounter_narrative: Narrative,
}

#[derive(Debug, Clone)]
pub struct WriterTurnRequest {
    pub encounter_id: String,
    pub document: PredictedDocument,
    pub transcript: Vec<ClarificationExchange>,
    /// False on the closing turn once the clarification budget is spent.
    pub questions_allowed: bool,
}

#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub encounter_id: String,
    pub question: String,
    /// Encounter narrative, patient narrative, then present category narratives.
    pub narratives: Vec<Narrative>,
}

#[derive(Debug, Clone)]
pub struct RefinementRequest {
    pub encounter_id: String,
    pub document: GeneratedDocument,
    /// Diagnosis, drug and procedure names from the encounter's records.
    pub clinical_terms: Vec<String>,
    pub facility_style_profile: Option<String>,
}

#[async_trait]
pub trait CategorySummarizerPort: Send + Sync {
    async fn summarize(&self, req: CategorySummaryRequest) -> Result<Narrative, PipelineError>;
}

#[async_trait]
pub trait PatientNarratorPort: Send + Sync {
    async fn narrate(&self, req: PatientNarrationRequest) -> Result<Narrative, PipelineError>;
}

#[async_trait]
pub trait ContextFuserPort: Send + Sync {
    async fn fuse(&self, req: FusionRequest) -> Result<Narrative, PipelineError>;
}

#[async_trait]
pub trait DocumentPredictorPort: Send + Sync {
    async fn predict(
        &self,
        req: PredictionRequest,
    ) -> Result<Vec<PredictedDocument>, PipelineError>;
}

#[async_trait]
pub trait DocumentWriterPort: Send + Sync {
    async fn next_step(&self, req: WriterTurnRequest) -> Result<WriterStep, PipelineError>;
}

#[async_trait]
pub trait CaseOraclePort: Send + Sync {
    async fn answer(&self, req: OracleRequest) -> Result<OracleAnswer, PipelineError>;
}

#[async_trait]
pub trait AuthenticityRefinerPort: Send + Sync {
    async fn refine(&self, req: RefinementRequest) -> Result<RefinerOutput, PipelineError>;
}

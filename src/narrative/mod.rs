pub mod adapters;
pub mod fact_guard;
pub mod pipeline;
pub mod ports;
pub mod prompts;
pub mod synthesizer;
pub mod telemetry;
pub mod types;

pub use pipeline::{
    EncounterPipeline, PersistedDocument, PipelinePorts, PipelineRun, PipelineSettings,
};
pub use synthesizer::DocumentSynthesizer;
pub use types::{
    CategoryNarratives, FactDriftPolicy, GeneratedDocument, KeptText, Narrative, OracleAnswer,
    OracleMode, PipelineStage, PredictedDocument, RefinedDocument, WriterStep,
};

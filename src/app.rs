use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    ai_gateway::{AIGateway, credentials::EnvCredentialProvider, telemetry::TracingTelemetrySink},
    config::{Config, TelemetryConfig, TelemetrySinkKind},
    dataset::{Dataset, EncounterSelector},
    narrative::{
        EncounterPipeline, PipelinePorts, PipelineRun,
        adapters::ai_gateway::{
            AIGatewayAuthenticityRefiner, AIGatewayCaseOracle, AIGatewayCategorySummarizer,
            AIGatewayContextFuser, AIGatewayDocumentPredictor, AIGatewayDocumentWriter,
            AIGatewayPatientNarrator, AUTHENTICITY_REFINER_STAGE, CASE_ORACLE_STAGE,
            CATEGORY_SUMMARIZER_STAGE, CONTEXT_FUSER_STAGE, DOCUMENT_PREDICTOR_STAGE,
            DOCUMENT_WRITER_STAGE, PATIENT_NARRATOR_STAGE,
        },
        telemetry::{
            JsonlTelemetrySink, NoopTelemetrySink, PipelineTelemetrySink,
            TracingTelemetrySink as PipelineTracingSink,
        },
    },
    output::OutputStore,
};

/// Wires every reasoning stage to the gateway with its own generation params.
pub fn build_ports(config: &Config, gateway: Arc<AIGateway>) -> PipelinePorts {
    let generation = &config.generation;
    PipelinePorts {
        patient_narrator: Arc::new(AIGatewayPatientNarrator::new(
            gateway.clone(),
            generation.for_stage(PATIENT_NARRATOR_STAGE),
        )),
        summarizer: Arc::new(AIGatewayCategorySummarizer::new(
            gateway.clone(),
            generation.for_stage(CATEGORY_SUMMARIZER_STAGE),
        )),
        fuser: Arc::new(AIGatewayContextFuser::new(
            gateway.clone(),
            generation.for_stage(CONTEXT_FUSER_STAGE),
        )),
        predictor: Arc::new(AIGatewayDocumentPredictor::new(
            gateway.clone(),
            generation.for_stage(DOCUMENT_PREDICTOR_STAGE),
        )),
        writer: Arc::new(AIGatewayDocumentWriter::new(
            gateway.clone(),
            generation.for_stage(DOCUMENT_WRITER_STAGE),
        )),
        oracle: Arc::new(AIGatewayCaseOracle::new(
            gateway.clone(),
            generation.for_stage(CASE_ORACLE_STAGE),
            config.oracle.mode,
        )),
        refiner: Arc::new(AIGatewayAuthenticityRefiner::new(
            gateway,
            generation.for_stage(AUTHENTICITY_REFINER_STAGE),
        )),
    }
}

pub fn build_pipeline_telemetry(
    telemetry: &TelemetryConfig,
) -> Result<Arc<dyn PipelineTelemetrySink>> {
    Ok(match telemetry.sink {
        TelemetrySinkKind::None => Arc::new(NoopTelemetrySink),
        TelemetrySinkKind::Tracing => Arc::new(PipelineTracingSink),
        TelemetrySinkKind::Jsonl => Arc::new(
            JsonlTelemetrySink::open(&telemetry.trace_file).with_context(|| {
                format!(
                    "failed to open telemetry trace file {}",
                    telemetry.trace_file.display()
                )
            })?,
        ),
    })
}

pub fn build_pipeline(config: &Config, gateway: Arc<AIGateway>) -> Result<EncounterPipeline> {
    let telemetry = build_pipeline_telemetry(&config.telemetry)?;
    Ok(EncounterPipeline::new(
        build_ports(config, gateway),
        config.pipeline_settings(),
        OutputStore::new(&config.output.dir, config.output.write_manifest),
        telemetry,
    ))
}

/// Loads the dataset, runs one encounter end to end, and returns what was
/// persisted.
pub async fn run(config: &Config) -> Result<PipelineRun> {
    let gateway = Arc::new(
        AIGateway::new(config.ai_gateway.clone(), Arc::new(EnvCredentialProvider))
            .context("failed to construct ai gateway")?
            .with_telemetry(Arc::new(TracingTelemetrySink)),
    );
    let pipeline = build_pipeline(config, gateway)?;

    let dataset = Dataset::load(&config.dataset.dir).with_context(|| {
        format!(
            "failed to load dataset from {}",
            config.dataset.dir.display()
        )
    })?;
    let selector = EncounterSelector::from_options(
        config.selection.encounter_id.clone(),
        config.selection.seed,
    );

    let run = pipeline
        .run(&dataset, &selector)
        .await
        .context("encounter pipeline failed")?;
    Ok(run)
}

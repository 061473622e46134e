use std::{path::PathBuf, sync::Arc, time::Instant};

use futures_util::future::{try_join, try_join_all};

use crate::{
    dataset::{Dataset, EncounterRecords, EncounterSelector, select_encounter},
    error::PipelineError,
    narrative::{
        fact_guard::guard_refinement,
        ports::{
            AuthenticityRefinerPort, CaseOraclePort, CategorySummarizerPort,
            CategorySummaryRequest, ContextFuserPort, DocumentPredictorPort, DocumentWriterPort,
            FusionRequest, PatientNarrationRequest, PatientNarratorPort, PredictionRequest,
            RefinementRequest,
        },
        synthesizer::{DEFAULT_MAX_CLARIFICATION_ROUNDS, DocumentSynthesizer},
        telemetry::{PipelineTelemetryEvent, PipelineTelemetrySink},
        types::{CategoryNarratives, FactDriftPolicy, KeptText, Narrative, PipelineStage},
    },
    output::OutputStore,
    records::Category,
};

#[derive(Clone)]
pub struct PipelinePorts {
    pub patient_narrator: Arc<dyn PatientNarratorPort>,
    pub summarizer: Arc<dyn CategorySummarizerPort>,
    pub fuser: Arc<dyn ContextFuserPort>,
    pub predictor: Arc<dyn DocumentPredictorPort>,
    pub writer: Arc<dyn DocumentWriterPort>,
    pub oracle: Arc<dyn CaseOraclePort>,
    pub refiner: Arc<dyn AuthenticityRefinerPort>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub concurrent_summaries: bool,
    pub max_clarification_rounds: u32,
    pub on_fact_drift: FactDriftPolicy,
    pub facility_style_profile: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrent_summaries: true,
            max_clarification_rounds: DEFAULT_MAX_CLARIFICATION_ROUNDS,
            on_fact_drift: FactDriftPolicy::default(),
            facility_style_profile: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersistedDocument {
    pub index: usize,
    pub path: PathBuf,
    pub document_type: String,
    pub kept: KeptText,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub encounter_id: String,
    /// Present only when at least one document was predicted.
    pub run_dir: Option<PathBuf>,
    pub variant: Option<u32>,
    pub summarized_categories: Vec<Category>,
    pub predicted_documents: usize,
    pub documents: Vec<PersistedDocument>,
}

struct RunProgress {
    encounter_id: Option<String>,
    stage: PipelineStage,
}

/// Runs one encounter through narration, prediction, synthesis, refinement
/// and persistence. Any stage failure ends the run; documents already
/// written stay on disk.
pub struct EncounterPipeline {
    ports: PipelinePorts,
    settings: PipelineSettings,
    store: OutputStore,
    synthesizer: DocumentSynthesizer,
    telemetry: Arc<dyn PipelineTelemetrySink>,
}

impl EncounterPipeline {
    pub fn new(
        ports: PipelinePorts,
        settings: PipelineSettings,
        store: OutputStore,
        telemetry: Arc<dyn PipelineTelemetrySink>,
    ) -> Self {
        let synthesizer = DocumentSynthesizer::new(
            ports.writer.clone(),
            ports.oracle.clone(),
            telemetry.clone(),
            settings.max_clarification_rounds,
        );
        Self {
            ports,
            settings,
            store,
            synthesizer,
            telemetry,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Selects an encounter from `dataset` and processes it.
    pub async fn run(
        &self,
        dataset: &Dataset,
        selector: &EncounterSelector,
    ) -> Result<PipelineRun, PipelineError> {
        let mut progress = RunProgress {
            encounter_id: None,
            stage: PipelineStage::SelectEncounter,
        };
        let started_at = Instant::now();
        let result = self.select_and_execute(dataset, selector, &mut progress).await;
        self.finish(result, progress, started_at)
    }

    /// Processes an already scoped encounter.
    pub async fn run_encounter(
        &self,
        scope: EncounterRecords,
    ) -> Result<PipelineRun, PipelineError> {
        let mut progress = RunProgress {
            encounter_id: Some(scope.encounter().id.clone()),
            stage: PipelineStage::SummarizeCategories,
        };
        let started_at = Instant::now();
        let result = self.execute(scope, &mut progress).await;
        self.finish(result, progress, started_at)
    }

    async fn select_and_execute(
        &self,
        dataset: &Dataset,
        selector: &EncounterSelector,
        progress: &mut RunProgress,
    ) -> Result<PipelineRun, PipelineError> {
        let stage_started = self.enter(progress, PipelineStage::SelectEncounter);
        let encounter = select_encounter(dataset, selector)?;
        progress.encounter_id = Some(encounter.id.clone());
        tracing::info!(
            target: "pipeline",
            encounter_id = %encounter.id,
            description = %encounter.description,
            encounterclass = %encounter.encounterclass,
            "encounter_selected"
        );
        self.complete(progress, stage_started);

        let stage_started = self.enter(progress, PipelineStage::LoadPatient);
        let scope = EncounterRecords::gather(dataset, encounter)?;
        for records in scope.categories() {
            tracing::info!(
                target: "pipeline",
                encounter_id = %scope.encounter().id,
                category = %records.category(),
                rows = records.len(),
                "category_records_loaded"
            );
        }
        self.complete(progress, stage_started);

        self.execute(scope, progress).await
    }

    async fn execute(
        &self,
        scope: EncounterRecords,
        progress: &mut RunProgress,
    ) -> Result<PipelineRun, PipelineError> {
        let encounter_id = scope.encounter().id.clone();

        let stage_started = self.enter(progress, PipelineStage::SummarizeCategories);
        let (patient_narrative, category_narratives) = self.narrate(&scope).await?;
        self.complete(progress, stage_started);

        let stage_started = self.enter(progress, PipelineStage::Fuse);
        let encounter_narrative = self
            .ports
            .fuser
            .fuse(FusionRequest {
                encounter: scope.encounter().clone(),
                patient_narrative: patient_narrative.clone(),
                category_narratives: category_narratives.clone(),
            })
            .await?;
        self.complete(progress, stage_started);

        let stage_started = self.enter(progress, PipelineStage::PredictDocuments);
        let predictions = self
            .ports
            .predictor
            .predict(PredictionRequest {
                encounter_id: encounter_id.clone(),
                encounter_narrative: encounter_narrative.clone(),
            })
            .await?;
        tracing::info!(
            target: "pipeline",
            encounter_id = %encounter_id,
            documents = predictions.len(),
            types = ?predictions.iter().map(|doc| doc.document_type.as_str()).collect::<Vec<_>>(),
            "documents_predicted"
        );
        self.complete(progress, stage_started);

        let mut run = PipelineRun {
            encounter_id: encounter_id.clone(),
            run_dir: None,
            variant: None,
            summarized_categories: category_narratives.present(),
            predicted_documents: predictions.len(),
            documents: Vec::new(),
        };
        if predictions.is_empty() {
            return Ok(run);
        }

        let mut oracle_context = vec![encounter_narrative, patient_narrative];
        oracle_context.extend(
            category_narratives
                .iter()
                .map(|(_, narrative)| narrative.clone()),
        );

        let clinical_terms = scope.clinical_terms();
        let mut slot = self.store.allocate(&encounter_id)?;
        run.run_dir = Some(slot.dir().to_path_buf());
        run.variant = Some(slot.variant());

        for predicted in &predictions {
            let stage_started = self.enter(progress, PipelineStage::Synthesize);
            let generated = self
                .synthesizer
                .synthesize(&encounter_id, predicted, &oracle_context)
                .await?;
            self.complete(progress, stage_started);

            let stage_started = self.enter(progress, PipelineStage::Refine);
            let refiner_output = self
                .ports
                .refiner
                .refine(RefinementRequest {
                    encounter_id: encounter_id.clone(),
                    document: generated.clone(),
                    clinical_terms: clinical_terms.clone(),
                    facility_style_profile: self.settings.facility_style_profile.clone(),
                })
                .await?;
            let refined = guard_refinement(
                self.settings.on_fact_drift,
                &generated,
                &clinical_terms,
                refiner_output,
            )?;
            self.complete(progress, stage_started);

            let stage_started = self.enter(progress, PipelineStage::Persist);
            let path = slot.persist(predicted, &refined)?;
            let index = run.documents.len();
            self.telemetry
                .on_event(PipelineTelemetryEvent::DocumentPersisted {
                    encounter_id: encounter_id.clone(),
                    index,
                    path: path.clone(),
                    document_type: predicted.document_type.clone(),
                    kept: refined.kept,
                });
            run.documents.push(PersistedDocument {
                index,
                path,
                document_type: predicted.document_type.clone(),
                kept: refined.kept,
            });
            self.complete(progress, stage_started);
        }

        Ok(run)
    }

    async fn narrate(
        &self,
        scope: &EncounterRecords,
    ) -> Result<(Narrative, CategoryNarratives), PipelineError> {
        let encounter_id = scope.encounter().id.clone();
        for category in Category::ALL {
            if scope.category(category).is_none() {
                self.telemetry
                    .on_event(PipelineTelemetryEvent::CategorySkipped {
                        encounter_id: encounter_id.clone(),
                        category,
                    });
            }
        }

        let patient_request = PatientNarrationRequest {
            encounter_id: encounter_id.clone(),
            patient: scope.patient().clone(),
        };
        let requests: Vec<CategorySummaryRequest> = scope
            .categories()
            .map(|records| CategorySummaryRequest {
                encounter_id: encounter_id.clone(),
                records: records.clone(),
            })
            .collect();

        if self.settings.concurrent_summaries {
            let patient = self.ports.patient_narrator.narrate(patient_request);
            let categories = try_join_all(requests.into_iter().map(|request| {
                let summarizer = self.ports.summarizer.clone();
                async move {
                    let category = request.category();
                    summarizer
                        .summarize(request)
                        .await
                        .map(|narrative| (category, narrative))
                }
            }));
            let (patient_narrative, summaries) = try_join(patient, categories).await?;
            return Ok((patient_narrative, summaries.into_iter().collect()));
        }

        let patient_narrative = self.ports.patient_narrator.narrate(patient_request).await?;
        let mut category_narratives = CategoryNarratives::default();
        for request in requests {
            let category = request.category();
            let narrative = self.ports.summarizer.summarize(request).await?;
            category_narratives.insert(category, narrative);
        }
        Ok((patient_narrative, category_narratives))
    }

    fn enter(&self, progress: &mut RunProgress, stage: PipelineStage) -> Instant {
        progress.stage = stage;
        if let Some(encounter_id) = &progress.encounter_id {
            self.telemetry.on_event(PipelineTelemetryEvent::StageStarted {
                encounter_id: encounter_id.clone(),
                stage,
            });
        }
        Instant::now()
    }

    fn complete(&self, progress: &RunProgress, started_at: Instant) {
        if let Some(encounter_id) = &progress.encounter_id {
            self.telemetry
                .on_event(PipelineTelemetryEvent::StageCompleted {
                    encounter_id: encounter_id.clone(),
                    stage: progress.stage,
                    elapsed_ms: started_at.elapsed().as_millis() as u64,
                });
        }
    }

    fn finish(
        &self,
        result: Result<PipelineRun, PipelineError>,
        progress: RunProgress,
        started_at: Instant,
    ) -> Result<PipelineRun, PipelineError> {
        match result {
            Ok(run) => {
                self.telemetry.on_event(PipelineTelemetryEvent::RunCompleted {
                    encounter_id: run.encounter_id.clone(),
                    documents: run.documents.len(),
                    elapsed_ms: started_at.elapsed().as_millis() as u64,
                });
                Ok(run)
            }
            Err(err) => {
                tracing::error!(
                    target: "pipeline",
                    encounter_id = progress.encounter_id.as_deref().unwrap_or("-"),
                    stage = progress.stage.as_str(),
                    error = %err,
                    "run_aborted"
                );
                self.telemetry.on_event(PipelineTelemetryEvent::RunFailed {
                    encounter_id: progress.encounter_id,
                    stage: progress.stage,
                    error_kind: err.kind,
                });
                Err(err)
            }
        }
    }
}

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    error::{PipelineError, PipelineErrorKind, persistence},
    narrative::types::{KeptText, PipelineStage},
    records::Category,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineTelemetryEvent {
    StageStarted {
        encounter_id: String,
        stage: PipelineStage,
    },
    StageCompleted {
        encounter_id: String,
        stage: PipelineStage,
        elapsed_ms: u64,
    },
    CategorySkipped {
        encounter_id: String,
        category: Category,
    },
    OracleQueried {
        encounter_id: String,
        document_type: String,
        round: u32,
        question: String,
        insufficient_information: bool,
    },
    DocumentPersisted {
        encounter_id: String,
        index: usize,
        path: PathBuf,
        document_type: String,
        kept: KeptText,
    },
    RunCompleted {
        encounter_id: String,
        documents: usize,
        elapsed_ms: u64,
    },
    RunFailed {
        encounter_id: Option<String>,
        stage: PipelineStage,
        error_kind: PipelineErrorKind,
    },
}

pub trait PipelineTelemetrySink: Send + Sync {
    fn on_event(&self, event: PipelineTelemetryEvent);
}

#[derive(Default)]
pub struct NoopTelemetrySink;

impl PipelineTelemetrySink for NoopTelemetrySink {
    fn on_event(&self, _event: PipelineTelemetryEvent) {}
}

#[derive(Default)]
pub struct TracingTelemetrySink;

impl PipelineTelemetrySink for TracingTelemetrySink {
    fn on_event(&self, event: PipelineTelemetryEvent) {
        match event {
            PipelineTelemetryEvent::StageStarted {
                encounter_id,
                stage,
            } => {
                tracing::debug!(
                    target: "pipeline",
                    encounter_id = %encounter_id,
                    stage = stage.as_str(),
                    "stage_started"
                );
            }
            PipelineTelemetryEvent::StageCompleted {
                encounter_id,
                stage,
                elapsed_ms,
            } => {
                tracing::info!(
                    target: "pipeline",
                    encounter_id = %encounter_id,
                    stage = stage.as_str(),
                    elapsed_ms = elapsed_ms,
                    "stage_completed"
                );
            }
            PipelineTelemetryEvent::CategorySkipped {
                encounter_id,
                category,
            } => {
                tracing::debug!(
                    target: "pipeline",
                    encounter_id = %encounter_id,
                    category = %category,
                    "category_skipped"
                );
            }
            PipelineTelemetryEvent::OracleQueried {
                encounter_id,
                document_type,
                round,
                question,
                insufficient_information,
            } => {
                tracing::debug!(
                    target: "synthesizer",
                    encounter_id = %encounter_id,
                    document_type = %document_type,
                    round = round,
                    question = %question,
                    insufficient_information = insufficient_information,
                    "oracle_queried"
                );
            }
            PipelineTelemetryEvent::DocumentPersisted {
                encounter_id,
                index,
                path,
                document_type,
                kept,
            } => {
                tracing::info!(
                    target: "output",
                    encounter_id = %encounter_id,
                    index = index,
                    path = %path.display(),
                    document_type = %document_type,
                    kept = ?kept,
                    "document_persisted"
                );
            }
            PipelineTelemetryEvent::RunCompleted {
                encounter_id,
                documents,
                elapsed_ms,
            } => {
                tracing::info!(
                    target: "pipeline",
                    encounter_id = %encounter_id,
                    documents = documents,
                    elapsed_ms = elapsed_ms,
                    "run_completed"
                );
            }
            PipelineTelemetryEvent::RunFailed {
                encounter_id,
                stage,
                error_kind,
            } => {
                tracing::warn!(
                    target: "pipeline",
                    encounter_id = encounter_id.as_deref().unwrap_or("-"),
                    stage = stage.as_str(),
                    error_kind = ?error_kind,
                    "run_failed"
                );
            }
        }
    }
}

#[derive(Serialize)]
struct TraceLine<'a> {
    at: String,
    #[serde(flatten)]
    event: &'a PipelineTelemetryEvent,
}

/// Appends one JSON object per event to a trace file.
pub struct JsonlTelemetrySink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlTelemetrySink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                persistence(format!(
                    "failed to create trace directory '{}': {err}",
                    parent.display()
                ))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                persistence(format!(
                    "failed to open trace file '{}': {err}",
                    path.display()
                ))
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PipelineTelemetrySink for JsonlTelemetrySink {
    fn on_event(&self, event: PipelineTelemetryEvent) {
        let at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let line = match serde_json::to_string(&TraceLine { at, event: &event }) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(target: "pipeline", error = %err, "trace_event_encode_failed");
                return;
            }
        };

        // A poisoned lock only means another writer panicked mid-line.
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(file, "{line}") {
            tracing::warn!(
                target: "pipeline",
                path = %self.path.display(),
                error = %err,
                "trace_event_write_failed"
            );
        }
    }
}

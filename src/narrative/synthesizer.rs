use std::sync::Arc;

use crate::{
    error::{PipelineError, reasoning_engine},
    narrative::{
        ports::{CaseOraclePort, DocumentWriterPort, OracleRequest, WriterTurnRequest},
        telemetry::{PipelineTelemetryEvent, PipelineTelemetrySink},
        types::{
            ClarificationExchange, GeneratedDocument, Narrative, OracleAnswer, PredictedDocument,
            WriterStep,
        },
    },
};

pub const DEFAULT_MAX_CLARIFICATION_ROUNDS: u32 = 6;

/// Passed back to the writer when a strict oracle cannot answer.
pub const NOT_DOCUMENTED_ANSWER: &str = "Not documented in the available records.";

/// Writes one predicted document, letting the writer consult the case
/// oracle a bounded number of times.
pub struct DocumentSynthesizer {
    writer: Arc<dyn DocumentWriterPort>,
    oracle: Arc<dyn CaseOraclePort>,
    telemetry: Arc<dyn PipelineTelemetrySink>,
    max_clarification_rounds: u32,
}

impl DocumentSynthesizer {
    pub fn new(
        writer: Arc<dyn DocumentWriterPort>,
        oracle: Arc<dyn CaseOraclePort>,
        telemetry: Arc<dyn PipelineTelemetrySink>,
        max_clarification_rounds: u32,
    ) -> Self {
        Self {
            writer,
            oracle,
            telemetry,
            max_clarification_rounds,
        }
    }

    pub async fn synthesize(
        &self,
        encounter_id: &str,
        document: &PredictedDocument,
        narratives: &[Narrative],
    ) -> Result<GeneratedDocument, PipelineError> {
        let mut transcript: Vec<ClarificationExchange> = Vec::new();
        let mut rounds = 0_u32;

        loop {
            let questions_allowed = rounds < self.max_clarification_rounds;
            let step = self
                .writer
                .next_step(WriterTurnRequest {
                    encounter_id: encounter_id.to_string(),
                    document: document.clone(),
                    transcript: transcript.clone(),
                    questions_allowed,
                })
                .await?;

            let question = match step {
                WriterStep::Finish { document: content } => {
                    if content.trim().is_empty() {
                        return Err(reasoning_engine(format!(
                            "writer finished '{}' with an empty document",
                            document.document_type
                        )));
                    }
                    tracing::debug!(
                        target: "synthesizer",
                        encounter_id = %encounter_id,
                        document_type = %document.document_type,
                        rounds = rounds,
                        "document_finished"
                    );
                    return Ok(GeneratedDocument {
                        document_type: document.document_type.clone(),
                        content,
                        clarification_rounds: rounds,
                    });
                }
                WriterStep::Ask { question } => question,
            };

            if !questions_allowed {
                return Err(reasoning_engine(format!(
                    "clarification budget exhausted for '{}' after {} rounds",
                    document.document_type, rounds
                )));
            }
            let question = question.trim().to_string();
            if question.is_empty() {
                return Err(reasoning_engine(format!(
                    "writer asked an empty question for '{}'",
                    document.document_type
                )));
            }

            rounds += 1;
            let outcome = self
                .oracle
                .answer(OracleRequest {
                    encounter_id: encounter_id.to_string(),
                    question: question.clone(),
                    narratives: narratives.to_vec(),
                })
                .await?;
            let (answer, insufficient_information) = match outcome {
                OracleAnswer::Answer(answer) => (answer, false),
                OracleAnswer::InsufficientInformation => (NOT_DOCUMENTED_ANSWER.to_string(), true),
            };

            tracing::info!(
                target: "synthesizer",
                encounter_id = %encounter_id,
                document_type = %document.document_type,
                round = rounds,
                question = %question,
                insufficient_information = insufficient_information,
                "oracle_queried"
            );
            self.telemetry.on_event(PipelineTelemetryEvent::OracleQueried {
                encounter_id: encounter_id.to_string(),
                document_type: document.document_type.clone(),
                round: rounds,
                question: question.clone(),
                insufficient_information,
            });

            transcript.push(ClarificationExchange { question, answer });
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ai_gateway::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    DataIntegrity,
    TypeMismatch,
    Lookup,
    ReasoningEngine,
    Persistence,
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineError {
    pub kind: PipelineErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failures that happen before any reasoning call is made.
    pub fn is_input_failure(&self) -> bool {
        matches!(
            self.kind,
            PipelineErrorKind::DataIntegrity
                | PipelineErrorKind::TypeMismatch
                | PipelineErrorKind::Lookup
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            PipelineErrorKind::DataIntegrity => "data integrity error",
            PipelineErrorKind::TypeMismatch => "type mismatch",
            PipelineErrorKind::Lookup => "lookup error",
            PipelineErrorKind::ReasoningEngine => "reasoning engine error",
            PipelineErrorKind::Persistence => "persistence error",
            PipelineErrorKind::Configuration => "configuration error",
        };
        write!(f, "{}: {}", label, self.message)
    }
}

impl std::error::Error for PipelineError {}

impl From<GatewayError> for PipelineError {
    fn from(err: GatewayError) -> Self {
        reasoning_engine(err.to_string())
    }
}

pub fn data_integrity(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::DataIntegrity, message)
}

pub fn type_mismatch(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::TypeMismatch, message)
}

pub fn lookup_failed(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Lookup, message)
}

pub fn reasoning_engine(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::ReasoningEngine, message)
}

pub fn persistence(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Persistence, message)
}

pub fn configuration(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Configuration, message)
}

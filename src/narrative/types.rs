use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::records::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    SelectEncounter,
    LoadPatient,
    SummarizeCategories,
    Fuse,
    PredictDocuments,
    Synthesize,
    Refine,
    Persist,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::SelectEncounter => "select_encounter",
            PipelineStage::LoadPatient => "load_patient",
            PipelineStage::SummarizeCategories => "summarize_categories",
            PipelineStage::Fuse => "fuse",
            PipelineStage::PredictDocuments => "predict_documents",
            PipelineStage::Synthesize => "synthesize",
            PipelineStage::Refine => "refine",
            PipelineStage::Persist => "persist",
            PipelineStage::Done => "done",
        }
    }
}

/// Free text produced by the reasoning engine from structured input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Narrative {
    pub text: String,
}

impl Narrative {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Category narratives keyed by category. A missing key means the category
/// had no records for the encounter; a present narrative may still report
/// nothing of note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryNarratives {
    narratives: BTreeMap<Category, Narrative>,
}

impl CategoryNarratives {
    pub fn insert(&mut self, category: Category, narrative: Narrative) -> Option<Narrative> {
        self.narratives.insert(category, narrative)
    }

    pub fn get(&self, category: Category) -> Option<&Narrative> {
        self.narratives.get(&category)
    }

    pub fn is_absent(&self, category: Category) -> bool {
        !self.narratives.contains_key(&category)
    }

    pub fn len(&self) -> usize {
        self.narratives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.narratives.is_empty()
    }

    /// Present narratives in canonical category order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &Narrative)> {
        self.narratives
            .iter()
            .map(|(category, narrative)| (*category, narrative))
    }

    pub fn present(&self) -> Vec<Category> {
        self.narratives.keys().copied().collect()
    }
}

impl FromIterator<(Category, Narrative)> for CategoryNarratives {
    fn from_iter<T: IntoIterator<Item = (Category, Narrative)>>(iter: T) -> Self {
        Self {
            narratives: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictedDocument {
    pub document_type: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedDocument {
    pub document_type: String,
    pub content: String,
    pub clarification_rounds: u32,
}

/// Which text ended up persisted for a refined document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeptText {
    Refined,
    Original,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefinedDocument {
    pub document_type: String,
    pub content: String,
    pub applied_transformations: Vec<String>,
    /// Numbers, then clinical terms, of the synthesized document missing from
    /// the refined one.
    pub fact_drift: Vec<String>,
    pub kept: KeptText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClarificationExchange {
    pub question: String,
    pub answer: String,
}

/// One writer turn: either a clarification question or the finished text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WriterStep {
    Ask { question: String },
    Finish { document: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleAnswer {
    Answer(String),
    InsufficientInformation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleMode {
    /// The oracle never admits ignorance and fills gaps with plausible detail.
    #[default]
    Fabricate,
    Strict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactDriftPolicy {
    #[default]
    KeepOriginal,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinerOutput {
    pub realistic_document: String,
    pub applied_transformations: Vec<String>,
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    records::{
        row::CsvRow,
        timestamp::{ClinicalDate, ClinicalTimestamp},
    },
};

/// Encounter-linked record tables, each summarized independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Observations,
    Immunizations,
    Medications,
    Procedures,
    #[serde(rename = "careplans")]
    CarePlans,
    Conditions,
    Devices,
    ImagingStudies,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Observations,
        Category::Immunizations,
        Category::Medications,
        Category::Procedures,
        Category::CarePlans,
        Category::Conditions,
        Category::Devices,
        Category::ImagingStudies,
    ];

    /// Dataset table (CSV file stem) holding this category.
    pub fn table(&self) -> &'static str {
        match self {
            Category::Observations => "observations",
            Category::Immunizations => "immunizations",
            Category::Medications => "medications",
            Category::Procedures => "procedures",
            Category::CarePlans => "careplans",
            Category::Conditions => "conditions",
            Category::Devices => "devices",
            Category::ImagingStudies => "imaging_studies",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Observations => "observations",
            Category::Immunizations => "immunizations",
            Category::Medications => "medications",
            Category::Procedures => "procedures",
            Category::CarePlans => "care plans",
            Category::Conditions => "conditions",
            Category::Devices => "devices",
            Category::ImagingStudies => "imaging studies",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

pub trait CategoryRecord: Sized {
    const CATEGORY: Category;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError>;
    fn patient(&self) -> &str;
    fn encounter(&self) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub date: ClinicalTimestamp,
    pub patient: String,
    pub encounter: Option<String>,
    pub category: Option<String>,
    pub code: String,
    pub description: String,
    pub value: String,
    pub units: Option<String>,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl CategoryRecord for Observation {
    const CATEGORY: Category = Category::Observations;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        Ok(Self {
            date: row.required_timestamp("DATE")?,
            patient: row.required_str("PATIENT")?,
            encounter: row.optional_str("ENCOUNTER"),
            category: row.optional_str("CATEGORY"),
            code: row.required_str("CODE")?,
            description: row.required_str("DESCRIPTION")?,
            value: row.required_str("VALUE")?,
            units: row.optional_str("UNITS"),
            value_type: row.required_str("TYPE")?,
        })
    }

    fn patient(&self) -> &str {
        &self.patient
    }

    fn encounter(&self) -> Option<&str> {
        self.encounter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Immunization {
    pub date: ClinicalTimestamp,
    pub patient: String,
    pub encounter: Option<String>,
    pub code: i64,
    pub description: String,
    pub base_cost: f64,
}

impl CategoryRecord for Immunization {
    const CATEGORY: Category = Category::Immunizations;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        Ok(Self {
            date: row.required_timestamp("DATE")?,
            patient: row.required_str("PATIENT")?,
            encounter: row.optional_str("ENCOUNTER"),
            code: row.required_i64("CODE")?,
            description: row.required_str("DESCRIPTION")?,
            base_cost: row.required_f64("BASE_COST")?,
        })
    }

    fn patient(&self) -> &str {
        &self.patient
    }

    fn encounter(&self) -> Option<&str> {
        self.encounter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Medication {
    pub start: ClinicalTimestamp,
    pub stop: Option<ClinicalTimestamp>,
    pub patient: String,
    pub payer: String,
    pub encounter: Option<String>,
    pub code: i64,
    pub description: String,
    pub base_cost: f64,
    pub payer_coverage: f64,
    pub dispenses: i64,
    pub totalcost: f64,
    pub reasoncode: Option<String>,
    pub reasondescription: Option<String>,
}

impl CategoryRecord for Medication {
    const CATEGORY: Category = Category::Medications;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        Ok(Self {
            start: row.required_timestamp("START")?,
            stop: row.optional_timestamp("STOP")?,
            patient: row.required_str("PATIENT")?,
            payer: row.required_str("PAYER")?,
            encounter: row.optional_str("ENCOUNTER"),
            code: row.required_i64("CODE")?,
            description: row.required_str("DESCRIPTION")?,
            base_cost: row.required_f64("BASE_COST")?,
            payer_coverage: row.required_f64("PAYER_COVERAGE")?,
            dispenses: row.required_i64("DISPENSES")?,
            totalcost: row.required_f64("TOTALCOST")?,
            reasoncode: row.optional_code("REASONCODE"),
            reasondescription: row.optional_str("REASONDESCRIPTION"),
        })
    }

    fn patient(&self) -> &str {
        &self.patient
    }

    fn encounter(&self) -> Option<&str> {
        self.encounter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Procedure {
    pub date: ClinicalTimestamp,
    pub patient: String,
    pub encounter: Option<String>,
    pub code: i64,
    pub description: String,
    pub base_cost: f64,
    pub reasoncode: Option<String>,
    pub reasondescription: Option<String>,
}

impl CategoryRecord for Procedure {
    const CATEGORY: Category = Category::Procedures;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        // Newer exports carry START/STOP instead of DATE.
        let date_column = if row.has_column("DATE") {
            "DATE"
        } else {
            "START"
        };
        Ok(Self {
            date: row.required_timestamp(date_column)?,
            patient: row.required_str("PATIENT")?,
            encounter: row.optional_str("ENCOUNTER"),
            code: row.required_i64("CODE")?,
            description: row.required_str("DESCRIPTION")?,
            base_cost: row.required_f64("BASE_COST")?,
            reasoncode: row.optional_code("REASONCODE"),
            reasondescription: row.optional_str("REASONDESCRIPTION"),
        })
    }

    fn patient(&self) -> &str {
        &self.patient
    }

    fn encounter(&self) -> Option<&str> {
        self.encounter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarePlan {
    pub id: String,
    pub start: ClinicalDate,
    pub stop: Option<ClinicalDate>,
    pub patient: String,
    pub encounter: Option<String>,
    pub code: i64,
    pub description: String,
    pub reasoncode: Option<String>,
    pub reasondescription: Option<String>,
}

impl CategoryRecord for CarePlan {
    const CATEGORY: Category = Category::CarePlans;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        Ok(Self {
            id: row.required_str("Id")?,
            start: row.required_date("START")?,
            stop: row.optional_date("STOP")?,
            patient: row.required_str("PATIENT")?,
            encounter: row.optional_str("ENCOUNTER"),
            code: row.required_i64("CODE")?,
            description: row.required_str("DESCRIPTION")?,
            reasoncode: row.optional_code("REASONCODE"),
            reasondescription: row.optional_str("REASONDESCRIPTION"),
        })
    }

    fn patient(&self) -> &str {
        &self.patient
    }

    fn encounter(&self) -> Option<&str> {
        self.encounter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub start: ClinicalDate,
    pub stop: Option<ClinicalDate>,
    pub patient: String,
    pub encounter: Option<String>,
    pub code: i64,
    pub description: String,
}

impl CategoryRecord for Condition {
    const CATEGORY: Category = Category::Conditions;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        Ok(Self {
            start: row.required_date("START")?,
            stop: row.optional_date("STOP")?,
            patient: row.required_str("PATIENT")?,
            encounter: row.optional_str("ENCOUNTER"),
            code: row.required_i64("CODE")?,
            description: row.required_str("DESCRIPTION")?,
        })
    }

    fn patient(&self) -> &str {
        &self.patient
    }

    fn encounter(&self) -> Option<&str> {
        self.encounter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub start: ClinicalTimestamp,
    pub stop: Option<ClinicalTimestamp>,
    pub patient: String,
    pub encounter: Option<String>,
    pub code: i64,
    pub description: String,
    pub udi: String,
}

impl CategoryRecord for Device {
    const CATEGORY: Category = Category::Devices;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        Ok(Self {
            start: row.required_timestamp("START")?,
            stop: row.optional_timestamp("STOP")?,
            patient: row.required_str("PATIENT")?,
            encounter: row.optional_str("ENCOUNTER"),
            code: row.required_i64("CODE")?,
            description: row.required_str("DESCRIPTION")?,
            udi: row.required_str("UDI")?,
        })
    }

    fn patient(&self) -> &str {
        &self.patient
    }

    fn encounter(&self) -> Option<&str> {
        self.encounter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagingStudy {
    pub id: String,
    pub date: ClinicalTimestamp,
    pub patient: String,
    pub encounter: Option<String>,
    pub bodysite_code: i64,
    pub bodysite_description: String,
    pub modality_code: String,
    pub modality_description: String,
    pub sop_code: String,
    pub sop_description: String,
}

impl CategoryRecord for ImagingStudy {
    const CATEGORY: Category = Category::ImagingStudies;

    fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        Ok(Self {
            id: row.required_str("Id")?,
            date: row.required_timestamp("DATE")?,
            patient: row.required_str("PATIENT")?,
            encounter: row.optional_str("ENCOUNTER"),
            bodysite_code: row.required_i64("BODYSITE_CODE")?,
            bodysite_description: row.required_str("BODYSITE_DESCRIPTION")?,
            modality_code: row.required_str("MODALITY_CODE")?,
            modality_description: row.required_str("MODALITY_DESCRIPTION")?,
            sop_code: row.required_str("SOP_CODE")?,
            sop_description: row.required_str("SOP_DESCRIPTION")?,
        })
    }

    fn patient(&self) -> &str {
        &self.patient
    }

    fn encounter(&self) -> Option<&str> {
        self.encounter.as_deref()
    }
}

/// Source-ordered, validated records of a single category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CategoryRecords {
    Observations(Vec<Observation>),
    Immunizations(Vec<Immunization>),
    Medications(Vec<Medication>),
    Procedures(Vec<Procedure>),
    CarePlans(Vec<CarePlan>),
    Conditions(Vec<Condition>),
    Devices(Vec<Device>),
    ImagingStudies(Vec<ImagingStudy>),
}

impl CategoryRecords {
    pub fn parse<'a>(
        category: Category,
        rows: impl IntoIterator<Item = &'a CsvRow>,
    ) -> Result<Self, PipelineError> {
        let records = match category {
            Category::Observations => Self::Observations(parse_rows(rows)?),
            Category::Immunizations => Self::Immunizations(parse_rows(rows)?),
            Category::Medications => Self::Medications(parse_rows(rows)?),
            Category::Procedures => Self::Procedures(parse_rows(rows)?),
            Category::CarePlans => Self::CarePlans(parse_rows(rows)?),
            Category::Conditions => Self::Conditions(parse_rows(rows)?),
            Category::Devices => Self::Devices(parse_rows(rows)?),
            Category::ImagingStudies => Self::ImagingStudies(parse_rows(rows)?),
        };
        Ok(records)
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Observations(_) => Category::Observations,
            Self::Immunizations(_) => Category::Immunizations,
            Self::Medications(_) => Category::Medications,
            Self::Procedures(_) => Category::Procedures,
            Self::CarePlans(_) => Category::CarePlans,
            Self::Conditions(_) => Category::Conditions,
            Self::Devices(_) => Category::Devices,
            Self::ImagingStudies(_) => Category::ImagingStudies,
        }
    }

    pub fn len(&self) -> usize {
        self.links().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(patient, encounter)` of every record, in source order.
    pub fn links(&self) -> Vec<(&str, Option<&str>)> {
        match self {
            Self::Observations(records) => links_of(records),
            Self::Immunizations(records) => links_of(records),
            Self::Medications(records) => links_of(records),
            Self::Procedures(records) => links_of(records),
            Self::CarePlans(records) => links_of(records),
            Self::Conditions(records) => links_of(records),
            Self::Devices(records) => links_of(records),
            Self::ImagingStudies(records) => links_of(records),
        }
    }

    /// Named clinical entities (drugs, diagnoses, procedures, vaccines,
    /// devices, care plans) in source order. Observations and imaging
    /// studies describe measurements, not entities, and contribute nothing.
    pub fn clinical_terms(&self) -> Vec<&str> {
        match self {
            Self::Observations(_) | Self::ImagingStudies(_) => Vec::new(),
            Self::Immunizations(records) => records.iter().map(|r| r.description.as_str()).collect(),
            Self::Medications(records) => records.iter().map(|r| r.description.as_str()).collect(),
            Self::Procedures(records) => records.iter().map(|r| r.description.as_str()).collect(),
            Self::CarePlans(records) => records.iter().map(|r| r.description.as_str()).collect(),
            Self::Conditions(records) => records.iter().map(|r| r.description.as_str()).collect(),
            Self::Devices(records) => records.iter().map(|r| r.description.as_str()).collect(),
        }
    }

    pub fn to_prompt_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn parse_rows<'a, T: CategoryRecord>(
    rows: impl IntoIterator<Item = &'a CsvRow>,
) -> Result<Vec<T>, PipelineError> {
    rows.into_iter().map(T::from_row).collect()
}

fn links_of<T: CategoryRecord>(records: &[T]) -> Vec<(&str, Option<&str>)> {
    records
        .iter()
        .map(|record| (record.patient(), record.encounter()))
        .collect()
}

use serde::Serialize;

use crate::{
    error::{PipelineError, data_integrity},
    records::{row::CsvRow, timestamp::ClinicalTimestamp},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncounterProfile {
    pub id: String,
    pub start: ClinicalTimestamp,
    pub stop: ClinicalTimestamp,
    pub patient: String,
    pub organization: String,
    pub provider: String,
    pub payer: String,
    pub encounterclass: String,
    pub code: i64,
    pub description: String,
    pub base_encounter_cost: f64,
    pub total_claim_cost: f64,
    pub payer_coverage: f64,
    pub reasoncode: Option<String>,
    pub reasondescription: Option<String>,
}

impl EncounterProfile {
    pub fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        let start = row.required_timestamp("START")?;
        let stop = row.required_timestamp("STOP")?;
        if stop < start {
            return Err(data_integrity(format!(
                "{} line {}: encounter stops at {} before it starts at {}",
                row.table(),
                row.line(),
                stop,
                start
            )));
        }

        Ok(Self {
            id: row.required_str("Id")?,
            start,
            stop,
            patient: row.required_str("PATIENT")?,
            organization: row.required_str("ORGANIZATION")?,
            provider: row.required_str("PROVIDER")?,
            payer: row.required_str("PAYER")?,
            encounterclass: row.required_str("ENCOUNTERCLASS")?,
            code: row.required_i64("CODE")?,
            description: row.required_str("DESCRIPTION")?,
            base_encounter_cost: row.required_f64("BASE_ENCOUNTER_COST")?,
            total_claim_cost: row.required_f64("TOTAL_CLAIM_COST")?,
            payer_coverage: row.required_f64("PAYER_COVERAGE")?,
            reasoncode: row.optional_code("REASONCODE"),
            reasondescription: row.optional_str("REASONDESCRIPTION"),
        })
    }
}

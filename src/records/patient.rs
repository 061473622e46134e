use serde::Serialize;

use crate::{
    error::PipelineError,
    records::{row::CsvRow, timestamp::ClinicalDate},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientProfile {
    pub id: String,
    pub birthdate: ClinicalDate,
    pub deathdate: Option<ClinicalDate>,
    pub ssn: String,
    pub drivers: Option<String>,
    pub passport: Option<String>,
    pub prefix: Option<String>,
    pub first: String,
    pub last: String,
    pub suffix: Option<String>,
    pub maiden: Option<String>,
    pub marital: Option<String>,
    pub race: String,
    pub ethnicity: String,
    pub gender: String,
    pub birthplace: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub county: String,
    pub zip: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub healthcare_expenses: f64,
    pub healthcare_coverage: f64,
}

impl PatientProfile {
    pub fn from_row(row: &CsvRow) -> Result<Self, PipelineError> {
        Ok(Self {
            id: row.required_str("Id")?,
            birthdate: row.required_date("BIRTHDATE")?,
            deathdate: row.optional_date("DEATHDATE")?,
            ssn: row.required_str("SSN")?,
            drivers: row.optional_str("DRIVERS"),
            passport: row.optional_str("PASSPORT"),
            prefix: row.optional_str("PREFIX"),
            first: row.required_str("FIRST")?,
            last: row.required_str("LAST")?,
            suffix: row.optional_str("SUFFIX"),
            maiden: row.optional_str("MAIDEN"),
            marital: row.optional_str("MARITAL"),
            race: row.required_str("RACE")?,
            ethnicity: row.required_str("ETHNICITY")?,
            gender: row.required_str("GENDER")?,
            birthplace: row.required_str("BIRTHPLACE")?,
            address: row.required_str("ADDRESS")?,
            city: row.required_str("CITY")?,
            state: row.required_str("STATE")?,
            county: row.required_str("COUNTY")?,
            zip: row.optional_code("ZIP"),
            lat: row.required_f64("LAT")?,
            lon: row.required_f64("LON")?,
            healthcare_expenses: row.required_f64("HEALTHCARE_EXPENSES")?,
            healthcare_coverage: row.required_f64("HEALTHCARE_COVERAGE")?,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.deathdate.is_none()
    }
}

use std::collections::HashMap;

use crate::{
    error::{PipelineError, data_integrity, type_mismatch},
    records::timestamp::{ClinicalDate, ClinicalTimestamp},
};

/// One data row of a CSV table, addressed by header name.
///
/// Every accessor applies the same optional-field rule: a missing column, an
/// empty cell, or a cell of only whitespace is "no value". Required accessors
/// turn "no value" into a data integrity error; optional accessors turn it
/// into `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    table: String,
    line: usize,
    values: HashMap<String, String>,
}

impl CsvRow {
    pub fn new(
        table: impl Into<String>,
        line: usize,
        headers: &[String],
        cells: impl IntoIterator<Item = String>,
    ) -> Self {
        let values = headers.iter().cloned().zip(cells).collect();
        Self {
            table: table.into(),
            line,
            values,
        }
    }

    pub fn from_pairs(table: impl Into<String>, pairs: &[(&str, &str)]) -> Self {
        Self {
            table: table.into(),
            line: 0,
            values: pairs
                .iter()
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn value(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn required_str(&self, column: &str) -> Result<String, PipelineError> {
        self.value(column)
            .map(str::to_string)
            .ok_or_else(|| self.missing(column))
    }

    pub fn optional_str(&self, column: &str) -> Option<String> {
        self.value(column).map(str::to_string)
    }

    /// Coded identifiers (SNOMED, LOINC, RxNorm) stay textual; a trailing
    /// `.0` left by spreadsheet re-export is dropped.
    pub fn required_code(&self, column: &str) -> Result<String, PipelineError> {
        self.required_str(column).map(|code| normalize_code(&code))
    }

    pub fn optional_code(&self, column: &str) -> Option<String> {
        self.optional_str(column).map(|code| normalize_code(&code))
    }

    pub fn required_date(&self, column: &str) -> Result<ClinicalDate, PipelineError> {
        let raw = self.value(column).ok_or_else(|| self.missing(column))?;
        ClinicalDate::parse(raw).map_err(|err| self.wrap(column, err))
    }

    pub fn optional_date(&self, column: &str) -> Result<Option<ClinicalDate>, PipelineError> {
        self.value(column)
            .map(|raw| ClinicalDate::parse(raw).map_err(|err| self.wrap(column, err)))
            .transpose()
    }

    pub fn required_timestamp(&self, column: &str) -> Result<ClinicalTimestamp, PipelineError> {
        let raw = self.value(column).ok_or_else(|| self.missing(column))?;
        ClinicalTimestamp::parse(raw).map_err(|err| self.wrap(column, err))
    }

    pub fn optional_timestamp(
        &self,
        column: &str,
    ) -> Result<Option<ClinicalTimestamp>, PipelineError> {
        self.value(column)
            .map(|raw| ClinicalTimestamp::parse(raw).map_err(|err| self.wrap(column, err)))
            .transpose()
    }

    pub fn required_f64(&self, column: &str) -> Result<f64, PipelineError> {
        let raw = self.value(column).ok_or_else(|| self.missing(column))?;
        self.parse_f64(column, raw)
    }

    pub fn optional_f64(&self, column: &str) -> Result<Option<f64>, PipelineError> {
        self.value(column)
            .map(|raw| self.parse_f64(column, raw))
            .transpose()
    }

    pub fn required_i64(&self, column: &str) -> Result<i64, PipelineError> {
        let raw = self.value(column).ok_or_else(|| self.missing(column))?;
        self.parse_i64(column, raw)
    }

    fn parse_f64(&self, column: &str, raw: &str) -> Result<f64, PipelineError> {
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(type_mismatch(format!(
                "{}: expected a number, found '{}'",
                self.location(column),
                raw
            ))),
        }
    }

    fn parse_i64(&self, column: &str, raw: &str) -> Result<i64, PipelineError> {
        if let Ok(value) = raw.parse::<i64>() {
            return Ok(value);
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
            _ => Err(type_mismatch(format!(
                "{}: expected an integer, found '{}'",
                self.location(column),
                raw
            ))),
        }
    }

    fn missing(&self, column: &str) -> PipelineError {
        if self.has_column(column) {
            data_integrity(format!("{}: required value is blank", self.location(column)))
        } else {
            data_integrity(format!("{}: required column is missing", self.location(column)))
        }
    }

    fn wrap(&self, column: &str, err: PipelineError) -> PipelineError {
        PipelineError::new(
            err.kind,
            format!("{}: {}", self.location(column), err.message),
        )
    }

    fn location(&self, column: &str) -> String {
        format!("{} line {} column {}", self.table, self.line, column)
    }
}

fn normalize_code(code: &str) -> String {
    code.strip_suffix(".0").unwrap_or(code).to_string()
}

use std::fmt;

use serde::{Serialize, Serializer};
use time::{
    Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};

use crate::error::{PipelineError, data_integrity};

/// Calendar date as exported by Synthea (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClinicalDate(Date);

/// UTC instant as exported by Synthea (`YYYY-MM-DDTHH:MM:SSZ`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClinicalTimestamp(OffsetDateTime);

impl ClinicalDate {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let trimmed = raw.trim();
        Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
            .map(Self)
            .map_err(|err| {
                data_integrity(format!("'{}' is not a YYYY-MM-DD date: {}", trimmed, err))
            })
    }

    pub fn date(&self) -> Date {
        self.0
    }
}

impl ClinicalTimestamp {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let trimmed = raw.trim();
        OffsetDateTime::parse(trimmed, &Rfc3339)
            .map(Self)
            .map_err(|err| {
                data_integrity(format!(
                    "'{}' is not an RFC 3339 timestamp: {}",
                    trimmed, err
                ))
            })
    }

    pub fn instant(&self) -> OffsetDateTime {
        self.0
    }

    pub fn date(&self) -> ClinicalDate {
        ClinicalDate(self.0.date())
    }
}

impl fmt::Display for ClinicalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .0
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl fmt::Display for ClinicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.format(&Rfc3339).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for ClinicalDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for ClinicalTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

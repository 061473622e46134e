pub mod category;
pub mod encounter;
pub mod patient;
pub mod row;
pub mod timestamp;

pub use category::{
    CarePlan, Category, CategoryRecord, CategoryRecords, Condition, Device, ImagingStudy,
    Immunization, Medication, Observation, Procedure,
};
pub use encounter::EncounterProfile;
pub use patient::PatientProfile;
pub use row::CsvRow;
pub use timestamp::{ClinicalDate, ClinicalTimestamp};

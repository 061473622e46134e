use std::collections::{BTreeMap, BTreeSet};

use crate::{
    dataset::loader::Dataset,
    error::{PipelineError, data_integrity, lookup_failed},
    records::{Category, CategoryRecords, EncounterProfile, PatientProfile},
};

pub const PATIENTS_TABLE: &str = "patients";

/// Everything known about one encounter: its profile, its patient, and the
/// non-empty record categories linked to it.
///
/// Construction guarantees every category record references this encounter.
#[derive(Debug, Clone)]
pub struct EncounterRecords {
    encounter: EncounterProfile,
    patient: PatientProfile,
    categories: BTreeMap<Category, CategoryRecords>,
}

impl EncounterRecords {
    pub fn new(
        encounter: EncounterProfile,
        patient: PatientProfile,
        categories: impl IntoIterator<Item = CategoryRecords>,
    ) -> Result<Self, PipelineError> {
        if patient.id != encounter.patient {
            return Err(data_integrity(format!(
                "encounter '{}' belongs to patient '{}', got profile of '{}'",
                encounter.id, encounter.patient, patient.id
            )));
        }

        let mut by_category = BTreeMap::new();
        for records in categories {
            let category = records.category();
            if let Some(index) = records
                .links()
                .iter()
                .position(|(_, linked)| *linked != Some(encounter.id.as_str()))
            {
                return Err(data_integrity(format!(
                    "{} record #{} does not belong to encounter '{}'",
                    category, index, encounter.id
                )));
            }
            if records.is_empty() {
                continue;
            }
            if by_category.insert(category, records).is_some() {
                return Err(data_integrity(format!(
                    "{} supplied more than once for encounter '{}'",
                    category, encounter.id
                )));
            }
        }

        Ok(Self {
            encounter,
            patient,
            categories: by_category,
        })
    }

    /// Resolves the patient and filters every category table down to rows
    /// whose `ENCOUNTER` equals the selected id. Absent tables are empty.
    pub fn gather(dataset: &Dataset, encounter: EncounterProfile) -> Result<Self, PipelineError> {
        let patients = dataset.require_table(PATIENTS_TABLE)?;
        let patient_row = patients
            .rows()
            .iter()
            .find(|row| row.value("Id") == Some(encounter.patient.as_str()))
            .ok_or_else(|| {
                lookup_failed(format!(
                    "patient '{}' of encounter '{}' not found",
                    encounter.patient, encounter.id
                ))
            })?;
        let patient = PatientProfile::from_row(patient_row)?;

        let mut categories = Vec::new();
        for category in Category::ALL {
            let Some(table) = dataset.table(category.table()) else {
                tracing::debug!(
                    target: "dataset",
                    category = %category,
                    "category_table_absent"
                );
                continue;
            };
            let rows = table
                .rows()
                .iter()
                .filter(|row| row.value("ENCOUNTER") == Some(encounter.id.as_str()));
            categories.push(CategoryRecords::parse(category, rows)?);
        }

        let scoped = Self::new(encounter, patient, categories)?;
        tracing::info!(
            target: "dataset",
            encounter_id = %scoped.encounter.id,
            categories = ?scoped.present_categories(),
            "encounter_scoped"
        );
        Ok(scoped)
    }

    pub fn encounter(&self) -> &EncounterProfile {
        &self.encounter
    }

    pub fn patient(&self) -> &PatientProfile {
        &self.patient
    }

    pub fn category(&self, category: Category) -> Option<&CategoryRecords> {
        self.categories.get(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryRecords> {
        self.categories.values()
    }

    pub fn present_categories(&self) -> Vec<Category> {
        self.categories.keys().copied().collect()
    }

    /// Distinct clinical entity names linked to the encounter, including its
    /// reason for visit, that a rewrite of any document must not alter.
    pub fn clinical_terms(&self) -> Vec<String> {
        let mut terms = BTreeSet::new();
        if let Some(reason) = &self.encounter.reasondescription {
            terms.insert(reason.clone());
        }
        for records in self.categories.values() {
            terms.extend(records.clinical_terms().into_iter().map(str::to_string));
        }
        terms.into_iter().collect()
    }
}

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{
    dataset::loader::Dataset,
    error::{PipelineError, lookup_failed},
    records::EncounterProfile,
};

pub const ENCOUNTERS_TABLE: &str = "encounters";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncounterSelector {
    Explicit(String),
    Seeded(u64),
}

impl EncounterSelector {
    pub fn from_options(encounter_id: Option<String>, seed: u64) -> Self {
        match encounter_id {
            Some(id) => Self::Explicit(id),
            None => Self::Seeded(seed),
        }
    }
}

/// Picks one encounter. Only the chosen row is validated.
pub fn select_encounter(
    dataset: &Dataset,
    selector: &EncounterSelector,
) -> Result<EncounterProfile, PipelineError> {
    let table = dataset.require_table(ENCOUNTERS_TABLE)?;
    let row = match selector {
        EncounterSelector::Explicit(id) => table
            .rows()
            .iter()
            .find(|row| row.value("Id") == Some(id.as_str()))
            .ok_or_else(|| lookup_failed(format!("encounter '{}' not found in the data", id)))?,
        EncounterSelector::Seeded(seed) => {
            let mut rng = StdRng::seed_from_u64(*seed);
            table
                .rows()
                .choose(&mut rng)
                .ok_or_else(|| lookup_failed("encounters table has no rows"))?
        }
    };

    let encounter = EncounterProfile::from_row(row)?;
    tracing::info!(
        target: "dataset",
        encounter_id = %encounter.id,
        selector = ?selector,
        "encounter_selected"
    );
    Ok(encounter)
}

pub mod loader;
pub mod scope;
pub mod selection;

pub use loader::{Dataset, DatasetError, Table};
pub use scope::EncounterRecords;
pub use selection::{EncounterSelector, select_encounter};

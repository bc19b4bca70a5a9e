//! Domain models.

pub mod codelist;
pub mod dimension;
pub mod hierarchy;
pub mod instance;
pub mod observation;

pub use codelist::{Code, CodeDataset, CodeList, DatasetEdition, Edition};
pub use dimension::{constraint_key, ConstraintCache, Dimension, OptionKey};
pub use hierarchy::{HierarchyElement, HierarchyResponse};
pub use instance::Instance;
pub use observation::{DimensionFilter, DimensionFilters, Observation, ObservationOption};

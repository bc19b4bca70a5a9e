//! Code list reference models.
//!
//! These entities are owned elsewhere; the access layer only reads them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeList {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    pub code_list_id: String,
    pub edition: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub code: String,
    pub label: String,
}

/// One edition of a dataset using a code, with its latest version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEdition {
    pub edition: String,
    pub latest_version: i64,
}

/// A published dataset that uses a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeDataset {
    pub dataset_id: String,
    pub editions: Vec<DatasetEdition>,
}

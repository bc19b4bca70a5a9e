//! Instance domain model.

use serde::{Deserialize, Serialize};

/// One imported dataset version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    /// CSV header columns in file order.
    pub csv_header: Vec<String>,
    pub dimensions: Vec<String>,
    pub dataset_id: Option<String>,
    pub edition: Option<String>,
    pub version: Option<i64>,
    pub is_published: bool,
}

impl Instance {
    pub fn new(instance_id: impl Into<String>, csv_header: Vec<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            csv_header,
            ..Self::default()
        }
    }

    /// The header as a single CSV line, without a trailing newline.
    pub fn header_line(&self) -> String {
        self.csv_header.join(",")
    }
}

//! Hierarchy read models.

use serde::{Deserialize, Serialize};

/// A single node of an instance hierarchy, without its relatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyElement {
    pub id: String,
    pub code: String,
    pub label: String,
    pub has_data: bool,
    pub number_of_children: i64,
    pub order: Option<i64>,
}

/// A hierarchy node with its children and breadcrumbs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyResponse {
    pub element: HierarchyElement,
    pub children: Vec<HierarchyElement>,
    /// Ancestors nearest-first, root excluded.
    pub breadcrumbs: Vec<HierarchyElement>,
}

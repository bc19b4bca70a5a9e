//! Backend-neutral statements.
//!
//! Every store round-trip is described by one [`Statement`]. Backends turn
//! statements into their own query dialect; nothing above the backend layer
//! ever sees query text.

/// One dimension of an observation selection, always with at least one option.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedDimension {
    pub name: String,
    pub options: Vec<String>,
}

/// One observation ready for bulk insertion, with option node ids resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub value: String,
    pub row_index: i64,
    pub option_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    // Hierarchy pipeline
    CreateHierarchyConstraints { instance_id: String, dimension: String },
    CloneNodes { instance_id: String, dimension: String, code_list_id: String },
    CountNodes { instance_id: String, dimension: String },
    CloneRelationships { instance_id: String, dimension: String, code_list_id: String },
    RemoveCloneEdges { instance_id: String, dimension: String },
    SetNumberOfChildren { instance_id: String, dimension: String },
    SetNumberOfChildrenFromIds { instance_id: String, dimension: String, ids: Vec<String> },
    SetHasData { instance_id: String, dimension: String },
    SetHasDataForCodes { instance_id: String, dimension: String, codes: Vec<String> },
    MarkNodesToRemain { instance_id: String, dimension: String },
    RemoveNodesNotMarkedToRemain { instance_id: String, dimension: String },
    RemoveRemainMarker { instance_id: String, dimension: String },

    // Sparse (leaf-up) hierarchy build
    GetCodesWithData { instance_id: String, dimension: String },
    GetGenericHierarchyNodeIds { code_list_id: String, codes: Vec<String> },
    GetGenericHierarchyAncestryIds { code_list_id: String, ids: Vec<String> },
    CloneNodesFromIds {
        instance_id: String,
        dimension: String,
        code_list_id: String,
        ids: Vec<String>,
        has_data: bool,
    },
    CloneRelationshipsFromIds { instance_id: String, dimension: String, code_list_id: String, ids: Vec<String> },
    RemoveCloneEdgesFromSourceIds { instance_id: String, dimension: String, ids: Vec<String> },
    GetHierarchyNodeIds { instance_id: String, dimension: String },

    // Hierarchy reads
    GetHierarchyCodelist { instance_id: String, dimension: String },
    GetHierarchyRoot { instance_id: String, dimension: String },
    GetHierarchyElement { instance_id: String, dimension: String, code: String },
    GetHierarchyChildren { instance_id: String, dimension: String, code: String },
    GetHierarchyParent { instance_id: String, dimension: String, code: String },

    // Instances
    CreateInstanceConstraint { instance_id: String },
    CreateInstance { instance_id: String, header: String },
    AddDimensions { instance_id: String, dimensions: Vec<String> },
    CreateCodeRelationship { instance_id: String, code_list_id: String, code: String },
    InstanceExists { instance_id: String },
    CountInsertedObservations { instance_id: String },
    AddVersionDetails { instance_id: String, dataset_id: String, edition: String, version: i64 },
    SetInstanceIsPublished { instance_id: String },

    // Dimension options
    CreateDimensionConstraint { instance_id: String, dimension: String },
    InsertDimensionOption { instance_id: String, dimension: String, option: String },

    // Observations
    StreamCsvRows { instance_id: String, dimensions: Vec<SelectedDimension>, limit: Option<i64> },
    InsertObservations { instance_id: String, records: Vec<ObservationRecord> },

    // Code lists
    GetCodeLists { filter_by: Option<String> },
    CodeListExists { code_list_id: String },
    GetEditions { code_list_id: String },
    GetEdition { code_list_id: String, edition: String },
    CountCodes { code_list_id: String, edition: String },
    GetCodes { code_list_id: String, edition: String },
    GetCode { code_list_id: String, edition: String, code: String },
    GetCodeDatasets { code_list_id: String, edition: String, code: String },
    GetCodeOrder { code_list_id: String, code: String },

    Ping,
}

impl Statement {
    /// Stable operation name, used for logging and call accounting.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateHierarchyConstraints { .. } => "create_hierarchy_constraints",
            Self::CloneNodes { .. } => "clone_nodes",
            Self::CountNodes { .. } => "count_nodes",
            Self::CloneRelationships { .. } => "clone_relationships",
            Self::RemoveCloneEdges { .. } => "remove_clone_edges",
            Self::SetNumberOfChildren { .. } => "set_number_of_children",
            Self::SetNumberOfChildrenFromIds { .. } => "set_number_of_children_from_ids",
            Self::SetHasData { .. } => "set_has_data",
            Self::SetHasDataForCodes { .. } => "set_has_data_for_codes",
            Self::MarkNodesToRemain { .. } => "mark_nodes_to_remain",
            Self::RemoveNodesNotMarkedToRemain { .. } => "remove_nodes_not_marked_to_remain",
            Self::RemoveRemainMarker { .. } => "remove_remain_marker",
            Self::GetCodesWithData { .. } => "get_codes_with_data",
            Self::GetGenericHierarchyNodeIds { .. } => "get_generic_hierarchy_node_ids",
            Self::GetGenericHierarchyAncestryIds { .. } => "get_generic_hierarchy_ancestry_ids",
            Self::CloneNodesFromIds { .. } => "clone_nodes_from_ids",
            Self::CloneRelationshipsFromIds { .. } => "clone_relationships_from_ids",
            Self::RemoveCloneEdgesFromSourceIds { .. } => "remove_clone_edges_from_source_ids",
            Self::GetHierarchyNodeIds { .. } => "get_hierarchy_node_ids",
            Self::GetHierarchyCodelist { .. } => "get_hierarchy_codelist",
            Self::GetHierarchyRoot { .. } => "get_hierarchy_root",
            Self::GetHierarchyElement { .. } => "get_hierarchy_element",
            Self::GetHierarchyChildren { .. } => "get_hierarchy_children",
            Self::GetHierarchyParent { .. } => "get_hierarchy_parent",
            Self::CreateInstanceConstraint { .. } => "create_instance_constraint",
            Self::CreateInstance { .. } => "create_instance",
            Self::AddDimensions { .. } => "add_dimensions",
            Self::CreateCodeRelationship { .. } => "create_code_relationship",
            Self::InstanceExists { .. } => "instance_exists",
            Self::CountInsertedObservations { .. } => "count_inserted_observations",
            Self::AddVersionDetails { .. } => "add_version_details",
            Self::SetInstanceIsPublished { .. } => "set_instance_is_published",
            Self::CreateDimensionConstraint { .. } => "create_dimension_constraint",
            Self::InsertDimensionOption { .. } => "insert_dimension_option",
            Self::StreamCsvRows { .. } => "stream_csv_rows",
            Self::InsertObservations { .. } => "insert_observations",
            Self::GetCodeLists { .. } => "get_code_lists",
            Self::CodeListExists { .. } => "code_list_exists",
            Self::GetEditions { .. } => "get_editions",
            Self::GetEdition { .. } => "get_edition",
            Self::CountCodes { .. } => "count_codes",
            Self::GetCodes { .. } => "get_codes",
            Self::GetCode { .. } => "get_code",
            Self::GetCodeDatasets { .. } => "get_code_datasets",
            Self::GetCodeOrder { .. } => "get_code_order",
            Self::Ping => "ping",
        }
    }
}

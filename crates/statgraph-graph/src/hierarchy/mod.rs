//! Instance hierarchy capability.
//!
//! The write side clones a code list's generic hierarchy into an
//! instance-and-dimension specific copy and prunes the branches without
//! data. Each stage is one store call, retried on its own, and safe to
//! re-run after a failure. The read side serves the finished hierarchy.
//!
//! Stage order (see [`HierarchyBuild`]):
//! 1. uniqueness constraints
//! 2. clone nodes (upsert by code, temporary `clone_of` edge)
//! 3. clone relationships, then drop the `clone_of` edges
//! 4. number of children
//! 5. has data
//! 6. mark nodes to remain (data nodes and all their ancestors)
//! 7. remove nodes not marked
//! 8. remove the remain marker

mod build;
mod read;

use async_trait::async_trait;
use statgraph_core::model::HierarchyResponse;
use statgraph_core::{GraphError, GraphResult};
use tracing::info;

use crate::cancel::CancelToken;
use crate::db::{require, GraphDb};
use crate::statement::Statement;

pub use build::{BuildReport, HierarchyBuild};
pub use read::sort_children;

#[async_trait]
pub trait HierarchyStore: Send + Sync {
    async fn create_instance_hierarchy_constraints(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    async fn clone_nodes(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        code_list_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    async fn count_nodes(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<i64>;

    /// Clones `hasParent` edges between cloned nodes, then removes the
    /// temporary `clone_of` edges.
    async fn clone_relationships(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        code_list_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    async fn remove_clone_edges(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    async fn set_number_of_children(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    async fn set_number_of_children_from_ids(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
        ids: Vec<String>,
    ) -> GraphResult<()>;

    async fn set_has_data(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    async fn set_has_data_for_codes(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
        codes: Vec<String>,
    ) -> GraphResult<()>;

    async fn mark_nodes_to_remain(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    async fn remove_nodes_not_marked_to_remain(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    async fn remove_remain_marker(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()>;

    /// Distinct option values inserted for this instance dimension.
    async fn get_codes_with_data(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<Vec<String>>;

    async fn get_generic_hierarchy_node_ids(
        &self,
        cancel: &CancelToken,
        code_list_id: &str,
        codes: Vec<String>,
    ) -> GraphResult<Vec<String>>;

    /// Ids of every generic ancestor of the given generic nodes.
    async fn get_generic_hierarchy_ancestry_ids(
        &self,
        cancel: &CancelToken,
        code_list_id: &str,
        ids: Vec<String>,
    ) -> GraphResult<Vec<String>>;

    #[allow(clippy::too_many_arguments)]
    async fn clone_nodes_from_ids(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        code_list_id: &str,
        dimension: &str,
        ids: Vec<String>,
        has_data: bool,
    ) -> GraphResult<()>;

    async fn clone_relationships_from_ids(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        code_list_id: &str,
        dimension: &str,
        ids: Vec<String>,
    ) -> GraphResult<()>;

    async fn remove_clone_edges_from_source_ids(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
        ids: Vec<String>,
    ) -> GraphResult<()>;

    async fn get_hierarchy_node_ids(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<Vec<String>>;

    /// The code list a hierarchy was cloned from.
    async fn get_hierarchy_codelist(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<String>;

    async fn hierarchy_exists(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<bool>;

    async fn get_hierarchy_root(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<HierarchyResponse>;

    async fn get_hierarchy_element(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        dimension: &str,
        code: &str,
    ) -> GraphResult<HierarchyResponse>;
}

impl GraphDb {
    /// One retried pipeline write, with stage context on failure.
    async fn stage_write(
        &self,
        cancel: &CancelToken,
        stage: &'static str,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
        statement: Statement,
    ) -> GraphResult<i64> {
        require(instance_id, "instance id")?;
        require(dimension, "dimension name")?;

        let affected = self
            .write(cancel, attempt, &statement)
            .await
            .map_err(|e| stage_error(stage, instance_id, dimension, attempt, e))?;

        info!(stage, instance_id, dimension, affected, "Hierarchy stage complete");
        Ok(affected)
    }

    async fn id_column(&self, cancel: &CancelToken, statement: Statement) -> GraphResult<Vec<String>> {
        self.read(cancel, &statement)
            .await?
            .iter()
            .map(|row| row.get_str("id"))
            .collect()
    }
}

pub(crate) fn stage_error(
    stage: &'static str,
    instance_id: &str,
    dimension: &str,
    attempt: u32,
    err: GraphError,
) -> GraphError {
    match err {
        GraphError::InvalidInput(_) | GraphError::Cancelled => err,
        err => GraphError::Stage {
            stage,
            instance_id: instance_id.to_string(),
            dimension: dimension.to_string(),
            attempt: err.attempts().unwrap_or(attempt),
            source: Box::new(err),
        },
    }
}

fn ids_of(instance_id: &str, dimension: &str) -> (String, String) {
    (instance_id.to_string(), dimension.to_string())
}

#[async_trait]
impl HierarchyStore for GraphDb {
    async fn create_instance_hierarchy_constraints(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::CreateHierarchyConstraints {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
        };
        self.stage_write(cancel, "create_hierarchy_constraints", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn clone_nodes(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        code_list_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        require(code_list_id, "code list id")?;
        let statement = Statement::CloneNodes {
            instance_id: instance_id.to_string(),
            dimension: dimension.to_string(),
            code_list_id: code_list_id.to_string(),
        };
        self.stage_write(cancel, "clone_nodes", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn count_nodes(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<i64> {
        require(instance_id, "instance id")?;
        require(dimension, "dimension name")?;
        let (instance_id, dimension) = ids_of(instance_id, dimension);
        self.count(cancel, &Statement::CountNodes { instance_id, dimension }).await
    }

    async fn clone_relationships(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        code_list_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        require(code_list_id, "code list id")?;
        let statement = Statement::CloneRelationships {
            instance_id: instance_id.to_string(),
            dimension: dimension.to_string(),
            code_list_id: code_list_id.to_string(),
        };
        self.stage_write(cancel, "clone_relationships", attempt, instance_id, dimension, statement)
            .await?;

        self.remove_clone_edges(cancel, attempt, instance_id, dimension).await
    }

    async fn remove_clone_edges(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::RemoveCloneEdges {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
        };
        self.stage_write(cancel, "remove_clone_edges", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn set_number_of_children(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::SetNumberOfChildren {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
        };
        self.stage_write(cancel, "set_number_of_children", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn set_number_of_children_from_ids(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
        ids: Vec<String>,
    ) -> GraphResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::SetNumberOfChildrenFromIds {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
            ids,
        };
        self.stage_write(cancel, "set_number_of_children_from_ids", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn set_has_data(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::SetHasData {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
        };
        self.stage_write(cancel, "set_has_data", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn set_has_data_for_codes(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
        codes: Vec<String>,
    ) -> GraphResult<()> {
        if codes.is_empty() {
            return Ok(());
        }
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::SetHasDataForCodes {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
            codes,
        };
        self.stage_write(cancel, "set_has_data_for_codes", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn mark_nodes_to_remain(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::MarkNodesToRemain {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
        };
        self.stage_write(cancel, "mark_nodes_to_remain", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn remove_nodes_not_marked_to_remain(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::RemoveNodesNotMarkedToRemain {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
        };
        self.stage_write(cancel, "remove_nodes_not_marked_to_remain", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn remove_remain_marker(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<()> {
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::RemoveRemainMarker {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
        };
        self.stage_write(cancel, "remove_remain_marker", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn get_codes_with_data(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<Vec<String>> {
        require(instance_id, "instance id")?;
        require(dimension, "dimension name")?;
        let (instance_id, dimension) = ids_of(instance_id, dimension);
        self.read(cancel, &Statement::GetCodesWithData { instance_id, dimension })
            .await?
            .iter()
            .map(|row| row.get_str("code"))
            .collect()
    }

    async fn get_generic_hierarchy_node_ids(
        &self,
        cancel: &CancelToken,
        code_list_id: &str,
        codes: Vec<String>,
    ) -> GraphResult<Vec<String>> {
        require(code_list_id, "code list id")?;
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let statement = Statement::GetGenericHierarchyNodeIds {
            code_list_id: code_list_id.to_string(),
            codes,
        };
        self.id_column(cancel, statement).await
    }

    async fn get_generic_hierarchy_ancestry_ids(
        &self,
        cancel: &CancelToken,
        code_list_id: &str,
        ids: Vec<String>,
    ) -> GraphResult<Vec<String>> {
        require(code_list_id, "code list id")?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let statement = Statement::GetGenericHierarchyAncestryIds {
            code_list_id: code_list_id.to_string(),
            ids,
        };
        self.id_column(cancel, statement).await
    }

    async fn clone_nodes_from_ids(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        code_list_id: &str,
        dimension: &str,
        ids: Vec<String>,
        has_data: bool,
    ) -> GraphResult<()> {
        require(code_list_id, "code list id")?;
        if ids.is_empty() {
            return Ok(());
        }
        let statement = Statement::CloneNodesFromIds {
            instance_id: instance_id.to_string(),
            dimension: dimension.to_string(),
            code_list_id: code_list_id.to_string(),
            ids,
            has_data,
        };
        self.stage_write(cancel, "clone_nodes_from_ids", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn clone_relationships_from_ids(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        code_list_id: &str,
        dimension: &str,
        ids: Vec<String>,
    ) -> GraphResult<()> {
        require(code_list_id, "code list id")?;
        if ids.is_empty() {
            return Ok(());
        }
        let statement = Statement::CloneRelationshipsFromIds {
            instance_id: instance_id.to_string(),
            dimension: dimension.to_string(),
            code_list_id: code_list_id.to_string(),
            ids,
        };
        self.stage_write(cancel, "clone_relationships_from_ids", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn remove_clone_edges_from_source_ids(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        dimension: &str,
        ids: Vec<String>,
    ) -> GraphResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let (instance_id_owned, dimension_owned) = ids_of(instance_id, dimension);
        let statement = Statement::RemoveCloneEdgesFromSourceIds {
            instance_id: instance_id_owned,
            dimension: dimension_owned,
            ids,
        };
        self.stage_write(cancel, "remove_clone_edges_from_source_ids", attempt, instance_id, dimension, statement)
            .await
            .map(|_| ())
    }

    async fn get_hierarchy_node_ids(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<Vec<String>> {
        require(instance_id, "instance id")?;
        require(dimension, "dimension name")?;
        let (instance_id, dimension) = ids_of(instance_id, dimension);
        self.id_column(cancel, Statement::GetHierarchyNodeIds { instance_id, dimension })
            .await
    }

    async fn get_hierarchy_codelist(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<String> {
        require(instance_id, "instance id")?;
        require(dimension, "dimension name")?;
        let (instance_id, dimension) = ids_of(instance_id, dimension);
        let statement = Statement::GetHierarchyCodelist { instance_id, dimension };
        let rows = self.read(cancel, &statement).await?;
        match rows.first() {
            Some(row) => row.get_str("code_list"),
            None => Err(GraphError::not_found("hierarchy code list")),
        }
    }

    async fn hierarchy_exists(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<bool> {
        Ok(self.count_nodes(cancel, instance_id, dimension).await? > 0)
    }

    async fn get_hierarchy_root(&self, cancel: &CancelToken, instance_id: &str, dimension: &str) -> GraphResult<HierarchyResponse> {
        self.hierarchy_root(cancel, instance_id, dimension).await
    }

    async fn get_hierarchy_element(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        dimension: &str,
        code: &str,
    ) -> GraphResult<HierarchyResponse> {
        self.hierarchy_element(cancel, instance_id, dimension, code).await
    }
}

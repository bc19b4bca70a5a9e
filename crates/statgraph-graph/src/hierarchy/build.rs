use std::collections::HashSet;
use std::future::Future;

use statgraph_core::{GraphError, GraphResult};
use tracing::{info, warn};

use super::{stage_error, HierarchyStore};
use crate::batch::process_in_concurrent_batches;
use crate::cancel::CancelToken;
use crate::db::{require, GraphDb};

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Nodes left in the instance hierarchy.
    pub nodes: i64,
    pub stages: Vec<&'static str>,
}

/// Builds the hierarchy of one instance dimension from a code list.
pub struct HierarchyBuild {
    db: GraphDb,
    instance_id: String,
    code_list_id: String,
    dimension: String,
}

impl HierarchyBuild {
    pub fn new(
        db: GraphDb,
        instance_id: impl Into<String>,
        code_list_id: impl Into<String>,
        dimension: impl Into<String>,
    ) -> Self {
        Self {
            db,
            instance_id: instance_id.into(),
            code_list_id: code_list_id.into(),
            dimension: dimension.into(),
        }
    }

    fn validate(&self) -> GraphResult<()> {
        require(&self.instance_id, "instance id")?;
        require(&self.code_list_id, "code list id")?;
        require(&self.dimension, "dimension name")
    }

    fn checkpoint(&self, cancel: &CancelToken, stage: &'static str, stages: &mut Vec<&'static str>) -> GraphResult<()> {
        stages.push(stage);
        if cancel.is_cancelled() {
            warn!(instance_id = %self.instance_id, dimension = %self.dimension, after = stage, "Hierarchy build cancelled");
            return Err(GraphError::Cancelled);
        }
        Ok(())
    }

    /// Clone the whole generic hierarchy, then prune branches without data.
    pub async fn run(&self, cancel: &CancelToken) -> GraphResult<BuildReport> {
        self.validate()?;
        let (db, i, cl, d) = (&self.db, self.instance_id.as_str(), self.code_list_id.as_str(), self.dimension.as_str());
        info!(instance_id = i, code_list_id = cl, dimension = d, "Building hierarchy");

        let mut stages = Vec::new();
        db.create_instance_hierarchy_constraints(cancel, 1, i, d).await?;
        self.checkpoint(cancel, "create_hierarchy_constraints", &mut stages)?;

        db.clone_nodes(cancel, 1, i, cl, d).await?;
        let cloned = db.count_nodes(cancel, i, d).await?;
        info!(instance_id = i, dimension = d, cloned, "Cloned hierarchy nodes");
        self.checkpoint(cancel, "clone_nodes", &mut stages)?;

        db.clone_relationships(cancel, 1, i, cl, d).await?;
        self.checkpoint(cancel, "clone_relationships", &mut stages)?;

        db.set_number_of_children(cancel, 1, i, d).await?;
        self.checkpoint(cancel, "set_number_of_children", &mut stages)?;

        db.set_has_data(cancel, 1, i, d).await?;
        self.checkpoint(cancel, "set_has_data", &mut stages)?;

        db.mark_nodes_to_remain(cancel, 1, i, d).await?;
        self.checkpoint(cancel, "mark_nodes_to_remain", &mut stages)?;

        db.remove_nodes_not_marked_to_remain(cancel, 1, i, d).await?;
        self.checkpoint(cancel, "remove_nodes_not_marked_to_remain", &mut stages)?;

        db.remove_remain_marker(cancel, 1, i, d).await?;
        stages.push("remove_remain_marker");

        let nodes = db.count_nodes(cancel, i, d).await?;
        info!(instance_id = i, dimension = d, nodes, "Hierarchy built");
        Ok(BuildReport { nodes, stages })
    }

    /// Clone only the generic nodes with data and their ancestors, in
    /// concurrent batches. Nothing is cloned that would later be pruned.
    pub async fn run_sparse(&self, cancel: &CancelToken) -> GraphResult<BuildReport> {
        self.validate()?;
        let (db, i, d) = (&self.db, self.instance_id.as_str(), self.dimension.as_str());
        info!(instance_id = i, code_list_id = %self.code_list_id, dimension = d, "Building sparse hierarchy");

        let mut stages = Vec::new();
        db.create_instance_hierarchy_constraints(cancel, 1, i, d).await?;
        self.checkpoint(cancel, "create_hierarchy_constraints", &mut stages)?;

        let codes = db.get_codes_with_data(cancel, i, d).await?;
        if codes.is_empty() {
            info!(instance_id = i, dimension = d, "No codes with data, hierarchy left empty");
            return Ok(BuildReport { nodes: 0, stages });
        }

        let code_list = self.code_list_id.clone();
        let leaves = self
            .batched("get_generic_hierarchy_node_ids", codes, move |db, batch| {
                let code_list = code_list.clone();
                async move { db.get_generic_hierarchy_node_ids(&CancelToken::new(), &code_list, batch).await }
            })
            .await?;
        self.checkpoint(cancel, "get_generic_hierarchy_node_ids", &mut stages)?;

        let code_list = self.code_list_id.clone();
        let ancestors: HashSet<String> = self
            .batched("get_generic_hierarchy_ancestry_ids", leaves.iter().cloned().collect(), move |db, batch| {
                let code_list = code_list.clone();
                async move { db.get_generic_hierarchy_ancestry_ids(&CancelToken::new(), &code_list, batch).await }
            })
            .await?
            .into_iter()
            .filter(|id| !leaves.contains(id))
            .collect();
        self.checkpoint(cancel, "get_generic_hierarchy_ancestry_ids", &mut stages)?;

        self.clone_from_ids(leaves.iter().cloned().collect(), true).await?;
        self.clone_from_ids(ancestors.iter().cloned().collect(), false).await?;
        self.checkpoint(cancel, "clone_nodes_from_ids", &mut stages)?;

        let all: Vec<String> = leaves.into_iter().chain(ancestors).collect();
        let (instance_id, code_list, dimension) = self.owned_ids();
        self.batched("clone_relationships_from_ids", all.clone(), move |db, batch| {
            let (instance_id, code_list, dimension) = (instance_id.clone(), code_list.clone(), dimension.clone());
            async move {
                db.clone_relationships_from_ids(&CancelToken::new(), 1, &instance_id, &code_list, &dimension, batch)
                    .await
                    .map(|_| Vec::new())
            }
        })
        .await?;
        self.checkpoint(cancel, "clone_relationships_from_ids", &mut stages)?;

        let (instance_id, _, dimension) = self.owned_ids();
        self.batched("remove_clone_edges_from_source_ids", all, move |db, batch| {
            let (instance_id, dimension) = (instance_id.clone(), dimension.clone());
            async move {
                db.remove_clone_edges_from_source_ids(&CancelToken::new(), 1, &instance_id, &dimension, batch)
                    .await
                    .map(|_| Vec::new())
            }
        })
        .await?;
        self.checkpoint(cancel, "remove_clone_edges_from_source_ids", &mut stages)?;

        let node_ids = db.get_hierarchy_node_ids(cancel, i, d).await?;
        let (instance_id, _, dimension) = self.owned_ids();
        self.batched("set_number_of_children_from_ids", node_ids, move |db, batch| {
            let (instance_id, dimension) = (instance_id.clone(), dimension.clone());
            async move {
                db.set_number_of_children_from_ids(&CancelToken::new(), 1, &instance_id, &dimension, batch)
                    .await
                    .map(|_| Vec::new())
            }
        })
        .await?;
        stages.push("set_number_of_children_from_ids");

        let nodes = db.count_nodes(cancel, i, d).await?;
        info!(instance_id = i, dimension = d, nodes, "Sparse hierarchy built");
        Ok(BuildReport { nodes, stages })
    }

    async fn clone_from_ids(&self, ids: Vec<String>, has_data: bool) -> GraphResult<()> {
        let (instance_id, code_list, dimension) = self.owned_ids();
        self.batched("clone_nodes_from_ids", ids, move |db, batch| {
            let (instance_id, code_list, dimension) = (instance_id.clone(), code_list.clone(), dimension.clone());
            async move {
                db.clone_nodes_from_ids(&CancelToken::new(), 1, &instance_id, &code_list, &dimension, batch, has_data)
                    .await
                    .map(|_| Vec::new())
            }
        })
        .await
        .map(|_| ())
    }

    fn owned_ids(&self) -> (String, String, String) {
        (self.instance_id.clone(), self.code_list_id.clone(), self.dimension.clone())
    }

    /// Dispatched batches run to completion; they are not tied to the
    /// caller's cancel token.
    async fn batched<F, Fut>(&self, stage: &'static str, items: Vec<String>, process: F) -> GraphResult<HashSet<String>>
    where
        F: Fn(GraphDb, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GraphResult<Vec<String>>> + Send + 'static,
    {
        if items.is_empty() {
            return Ok(HashSet::new());
        }
        let batch = &self.db.config().batch;
        let db = self.db.clone();
        let outcome = process_in_concurrent_batches(items, batch.batch_size, batch.max_workers, move |items| {
            process(db.clone(), items)
        })
        .await;

        if !outcome.errors.is_empty() {
            warn!(stage, failed = outcome.errors.len(), "Hierarchy batches failed");
        }
        outcome
            .into_result()
            .map_err(|e| stage_error(stage, &self.instance_id, &self.dimension, 1, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use statgraph_core::model::Dimension;
    use statgraph_core::{StoreConfig, StoreError};

    use crate::dimension::DimensionStore;
    use crate::instance::InstanceStore;
    use crate::memory::MemoryStore;
    use statgraph_core::model::{ConstraintCache, Instance};

    const INSTANCE: &str = "inst-1";
    const DIM: &str = "geography";
    const CODE_LIST: &str = "cl-geo";

    fn setup() -> (Arc<MemoryStore>, GraphDb) {
        let store = Arc::new(MemoryStore::new());
        let mut config = StoreConfig::memory();
        config.retry.base_delay_ms = 1;
        config.batch.batch_size = 2;
        config.batch.max_workers = 2;
        let db = GraphDb::new(store.clone(), config);
        (store, db)
    }

    /// Generic tree: A -> B -> C, A -> D. Each of `with_data` gets an option.
    async fn seed(store: &MemoryStore, db: &GraphDb, with_data: &[&str]) {
        store.add_generic_node(CODE_LIST, "A", "Alpha", None);
        store.add_generic_node(CODE_LIST, "B", "Beta", Some(1));
        store.add_generic_node(CODE_LIST, "C", "Gamma", None);
        store.add_generic_node(CODE_LIST, "D", "Delta", Some(0));
        store.set_generic_parent(CODE_LIST, "B", "A").unwrap();
        store.set_generic_parent(CODE_LIST, "C", "B").unwrap();
        store.set_generic_parent(CODE_LIST, "D", "A").unwrap();

        let cancel = CancelToken::new();
        let instance = Instance::new(INSTANCE, vec!["v4_0".into(), DIM.into()]);
        db.create_instance(&cancel, &instance).await.unwrap();

        let mut cache = ConstraintCache::new();
        for code in with_data {
            db.insert_dimension(&cancel, &mut cache, INSTANCE, &Dimension::new(DIM, *code))
                .await
                .unwrap();
        }
    }

    fn summary(store: &MemoryStore) -> Vec<(String, bool, Option<i64>)> {
        store
            .hierarchy_snapshot(INSTANCE, DIM)
            .into_iter()
            .map(|n| (n.code, n.has_data, n.number_of_children))
            .collect()
    }

    #[tokio::test]
    async fn test_chain_with_data_on_leaf_survives_whole() {
        let (store, db) = setup();
        store.add_generic_node(CODE_LIST, "A", "Alpha", None);
        store.add_generic_node(CODE_LIST, "B", "Beta", None);
        store.add_generic_node(CODE_LIST, "C", "Gamma", None);
        store.set_generic_parent(CODE_LIST, "B", "A").unwrap();
        store.set_generic_parent(CODE_LIST, "C", "B").unwrap();

        let cancel = CancelToken::new();
        db.create_instance(&cancel, &Instance::new(INSTANCE, vec![DIM.into()])).await.unwrap();
        let mut cache = ConstraintCache::new();
        db.insert_dimension(&cancel, &mut cache, INSTANCE, &Dimension::new(DIM, "C")).await.unwrap();

        let report = HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM).run(&cancel).await.unwrap();
        assert_eq!(report.nodes, 3);
        assert_eq!(report.stages.len(), 8);

        let nodes = store.hierarchy_snapshot(INSTANCE, DIM);
        assert!(nodes.iter().all(|n| n.remain.is_none() && n.clone_of.is_none()));
        assert_eq!(
            summary(&store),
            vec![
                ("A".to_string(), false, Some(1)),
                ("B".to_string(), false, Some(1)),
                ("C".to_string(), true, Some(0)),
            ]
        );
    }

    #[tokio::test]
    async fn test_branch_without_data_is_pruned() {
        let (store, db) = setup();
        seed(&store, &db, &["C"]).await;

        let cancel = CancelToken::new();
        HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM).run(&cancel).await.unwrap();

        let codes: Vec<String> = summary(&store).into_iter().map(|(code, _, _)| code).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
        assert!(store.constraints().contains(&format!("hierarchy:{INSTANCE}:{DIM}")));
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let (store, db) = setup();
        seed(&store, &db, &["C", "D"]).await;

        let cancel = CancelToken::new();
        let build = HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM);
        build.run(&cancel).await.unwrap();
        let first = summary(&store);
        build.run(&cancel).await.unwrap();
        assert_eq!(summary(&store), first);
    }

    #[tokio::test]
    async fn test_sparse_build_matches_pruned_tree() {
        let (store, db) = setup();
        seed(&store, &db, &["C"]).await;

        let cancel = CancelToken::new();
        let report = HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM)
            .run_sparse(&cancel)
            .await
            .unwrap();

        assert_eq!(report.nodes, 3);
        assert_eq!(
            summary(&store),
            vec![
                ("A".to_string(), false, Some(1)),
                ("B".to_string(), false, Some(1)),
                ("C".to_string(), true, Some(0)),
            ]
        );
        assert!(store.hierarchy_snapshot(INSTANCE, DIM).iter().all(|n| n.clone_of.is_none()));
    }

    #[tokio::test]
    async fn test_sparse_build_without_data_clones_nothing() {
        let (store, db) = setup();
        seed(&store, &db, &[]).await;

        let report = HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM)
            .run_sparse(&CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.nodes, 0);
        assert_eq!(store.calls("clone_nodes_from_ids"), 0);
    }

    #[tokio::test]
    async fn test_transient_stage_failure_is_retried() {
        let (store, db) = setup();
        seed(&store, &db, &["C"]).await;

        let before = store.calls("create_hierarchy_constraints");
        store.fail_next(StoreError::new("connection reset"));
        HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM)
            .run(&CancelToken::new())
            .await
            .unwrap();
        assert_eq!(store.calls("create_hierarchy_constraints") - before, 2);
    }

    #[tokio::test]
    async fn test_non_transient_stage_failure_carries_context() {
        let (store, db) = setup();
        seed(&store, &db, &["C"]).await;

        store.fail_next(StoreError::new("Invalid request arguments: bad label"));
        let err = HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM)
            .run(&CancelToken::new())
            .await
            .unwrap_err();

        match err {
            GraphError::Stage {
                stage,
                instance_id,
                dimension,
                attempt,
                ..
            } => {
                assert_eq!(stage, "create_hierarchy_constraints");
                assert_eq!(instance_id, INSTANCE);
                assert_eq!(dimension, DIM);
                assert_eq!(attempt, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.calls("clone_nodes"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_build_stops_before_next_stage() {
        let (store, db) = setup();
        seed(&store, &db, &["C"]).await;

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM)
            .run(&cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(store.calls("clone_nodes"), 0);
    }

    #[tokio::test]
    async fn test_blank_identifiers_rejected_without_store_calls() {
        let (store, db) = setup();
        let err = HierarchyBuild::new(db, "", CODE_LIST, DIM)
            .run(&CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput(_)));
        assert!(store.statement_log().is_empty());
    }

    #[tokio::test]
    async fn test_root_and_element_reads() {
        let (store, db) = setup();
        seed(&store, &db, &["C", "D"]).await;
        let cancel = CancelToken::new();
        HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM).run(&cancel).await.unwrap();

        let root = db.get_hierarchy_root(&cancel, INSTANCE, DIM).await.unwrap();
        assert_eq!(root.element.code, "A");
        assert!(root.breadcrumbs.is_empty());
        // D has order 0 and B order 1.
        let children: Vec<&str> = root.children.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(children, vec!["D", "B"]);

        let leaf = db.get_hierarchy_element(&cancel, INSTANCE, DIM, "C").await.unwrap();
        assert!(leaf.element.has_data);
        assert!(leaf.children.is_empty());
        let crumbs: Vec<&str> = leaf.breadcrumbs.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(crumbs, vec!["B"]);

        assert_eq!(db.get_hierarchy_codelist(&cancel, INSTANCE, DIM).await.unwrap(), CODE_LIST);
        assert!(db.hierarchy_exists(&cancel, INSTANCE, DIM).await.unwrap());
        assert!(!db.hierarchy_exists(&cancel, INSTANCE, "time").await.unwrap());
    }

    #[tokio::test]
    async fn test_two_roots_with_data_is_multiple_found() {
        let (store, db) = setup();
        seed(&store, &db, &["C"]).await;
        store.add_generic_node(CODE_LIST, "X", "Xi", None);
        let cancel = CancelToken::new();
        let mut cache = ConstraintCache::new();
        db.insert_dimension(&cancel, &mut cache, INSTANCE, &Dimension::new(DIM, "X"))
            .await
            .unwrap();
        HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM).run(&cancel).await.unwrap();

        let err = db.get_hierarchy_root(&cancel, INSTANCE, DIM).await.unwrap_err();
        assert!(matches!(err, GraphError::MultipleFound(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_unknown_element_is_not_found() {
        let (store, db) = setup();
        seed(&store, &db, &["C"]).await;
        let cancel = CancelToken::new();
        HierarchyBuild::new(db.clone(), INSTANCE, CODE_LIST, DIM).run(&cancel).await.unwrap();

        let err = db.get_hierarchy_element(&cancel, INSTANCE, DIM, "Z").await.unwrap_err();
        assert!(err.is_not_found());
    }
}

//! Dimension option insertion.

use async_trait::async_trait;
use statgraph_core::model::{constraint_key, ConstraintCache, Dimension};
use statgraph_core::{GraphError, GraphResult};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::db::{require, GraphDb};
use crate::statement::Statement;

#[async_trait]
pub trait DimensionStore: Send + Sync {
    /// Insert one dimension option and return it with its store node id.
    ///
    /// The uniqueness constraint for `(instance_id, dimension)` is created
    /// the first time the pair is seen by `cache`, and never again for the
    /// lifetime of that cache.
    async fn insert_dimension(
        &self,
        cancel: &CancelToken,
        cache: &mut ConstraintCache,
        instance_id: &str,
        dimension: &Dimension,
    ) -> GraphResult<Dimension>;
}

#[async_trait]
impl DimensionStore for GraphDb {
    async fn insert_dimension(
        &self,
        cancel: &CancelToken,
        cache: &mut ConstraintCache,
        instance_id: &str,
        dimension: &Dimension,
    ) -> GraphResult<Dimension> {
        require(instance_id, "instance id")?;
        require(&dimension.dimension_name, "dimension name")?;
        require(&dimension.option, "dimension option")?;

        let key = constraint_key(instance_id, &dimension.dimension_name);
        if !cache.contains_key(&key) {
            let statement = Statement::CreateDimensionConstraint {
                instance_id: instance_id.to_string(),
                dimension: dimension.dimension_name.clone(),
            };
            self.write(cancel, 1, &statement).await?;
            debug!(instance_id, dimension = %dimension.dimension_name, "Created dimension constraint");
            cache.insert(key, dimension.dimension_name.clone());
        }

        let statement = Statement::InsertDimensionOption {
            instance_id: instance_id.to_string(),
            dimension: dimension.dimension_name.clone(),
            option: dimension.option.clone(),
        };
        let row = self
            .read_one(cancel, &statement, &format!("instance '{}'", instance_id))
            .await?;
        let node_id = row.get_str("id")?;
        if node_id.is_empty() {
            return Err(GraphError::Internal("store returned an empty option node id".into()));
        }

        Ok(Dimension {
            node_id: Some(node_id),
            ..dimension.clone()
        })
    }
}

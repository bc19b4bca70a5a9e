//! Instance nodes: creation, metadata and publication.

use async_trait::async_trait;
use statgraph_core::model::Instance;
use statgraph_core::{GraphError, GraphResult};
use tracing::info;

use crate::cancel::CancelToken;
use crate::db::{require, GraphDb};
use crate::statement::Statement;

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn create_instance_constraint(&self, cancel: &CancelToken, instance_id: &str) -> GraphResult<()>;

    /// Create the instance node holding the CSV header.
    async fn create_instance(&self, cancel: &CancelToken, instance: &Instance) -> GraphResult<()>;

    async fn add_dimensions(&self, cancel: &CancelToken, instance: &Instance) -> GraphResult<()>;

    /// Link the instance to a code it uses.
    async fn create_code_relationship(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        code_list_id: &str,
        code: &str,
    ) -> GraphResult<()>;

    async fn instance_exists(&self, cancel: &CancelToken, instance_id: &str) -> GraphResult<bool>;

    async fn count_inserted_observations(&self, cancel: &CancelToken, instance_id: &str) -> GraphResult<i64>;

    async fn add_version_details_to_instance(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        dataset_id: &str,
        edition: &str,
        version: i64,
    ) -> GraphResult<()>;

    async fn set_instance_is_published(&self, cancel: &CancelToken, instance_id: &str) -> GraphResult<()>;
}

impl GraphDb {
    /// A property update that must touch exactly one instance node.
    async fn update_one(&self, cancel: &CancelToken, statement: Statement) -> GraphResult<()> {
        let affected = self.write(cancel, 1, &statement).await?;
        if affected != 1 {
            return Err(GraphError::RowsAffectedMismatch { expected: 1, actual: affected });
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for GraphDb {
    async fn create_instance_constraint(&self, cancel: &CancelToken, instance_id: &str) -> GraphResult<()> {
        require(instance_id, "instance id")?;
        let statement = Statement::CreateInstanceConstraint {
            instance_id: instance_id.to_string(),
        };
        self.write(cancel, 1, &statement).await?;
        info!(instance_id, "Created observation constraint");
        Ok(())
    }

    async fn create_instance(&self, cancel: &CancelToken, instance: &Instance) -> GraphResult<()> {
        require(&instance.instance_id, "instance id")?;
        if instance.csv_header.is_empty() {
            return Err(GraphError::invalid_input("instance csv header must not be empty"));
        }
        let statement = Statement::CreateInstance {
            instance_id: instance.instance_id.clone(),
            header: instance.header_line(),
        };
        self.write(cancel, 1, &statement).await?;
        info!(instance_id = %instance.instance_id, "Created instance node");
        Ok(())
    }

    async fn add_dimensions(&self, cancel: &CancelToken, instance: &Instance) -> GraphResult<()> {
        require(&instance.instance_id, "instance id")?;
        let statement = Statement::AddDimensions {
            instance_id: instance.instance_id.clone(),
            dimensions: instance.dimensions.clone(),
        };
        self.update_one(cancel, statement).await
    }

    async fn create_code_relationship(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        code_list_id: &str,
        code: &str,
    ) -> GraphResult<()> {
        require(instance_id, "instance id")?;
        require(code_list_id, "code list id")?;
        require(code, "code")?;
        let statement = Statement::CreateCodeRelationship {
            instance_id: instance_id.to_string(),
            code_list_id: code_list_id.to_string(),
            code: code.to_string(),
        };
        self.update_one(cancel, statement).await
    }

    async fn instance_exists(&self, cancel: &CancelToken, instance_id: &str) -> GraphResult<bool> {
        require(instance_id, "instance id")?;
        let statement = Statement::InstanceExists {
            instance_id: instance_id.to_string(),
        };
        Ok(self.count(cancel, &statement).await? > 0)
    }

    async fn count_inserted_observations(&self, cancel: &CancelToken, instance_id: &str) -> GraphResult<i64> {
        require(instance_id, "instance id")?;
        let statement = Statement::CountInsertedObservations {
            instance_id: instance_id.to_string(),
        };
        self.count(cancel, &statement).await
    }

    async fn add_version_details_to_instance(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        dataset_id: &str,
        edition: &str,
        version: i64,
    ) -> GraphResult<()> {
        require(instance_id, "instance id")?;
        require(dataset_id, "dataset id")?;
        require(edition, "edition")?;
        let statement = Statement::AddVersionDetails {
            instance_id: instance_id.to_string(),
            dataset_id: dataset_id.to_string(),
            edition: edition.to_string(),
            version,
        };
        self.update_one(cancel, statement).await?;
        info!(instance_id, dataset_id, edition, version, "Added version details to instance");
        Ok(())
    }

    async fn set_instance_is_published(&self, cancel: &CancelToken, instance_id: &str) -> GraphResult<()> {
        require(instance_id, "instance id")?;
        let statement = Statement::SetInstanceIsPublished {
            instance_id: instance_id.to_string(),
        };
        self.update_one(cancel, statement).await?;
        info!(instance_id, "Instance published");
        Ok(())
    }
}

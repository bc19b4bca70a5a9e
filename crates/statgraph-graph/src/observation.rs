//! Observation streaming and bulk insertion.

use std::collections::HashMap;

use async_trait::async_trait;
use statgraph_core::model::{DimensionFilters, Observation, OptionKey};
use statgraph_core::{GraphError, GraphResult};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::db::{require, GraphDb};
use crate::reader::{RowReader, StreamRowReader};
use crate::statement::{ObservationRecord, SelectedDimension, Statement};

#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Stream the instance header row followed by the matching observation
    /// rows. `filter_id` only identifies the request in logs.
    async fn stream_csv_rows(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        filter_id: &str,
        filter: Option<&DimensionFilters>,
        limit: Option<i64>,
    ) -> GraphResult<Box<dyn RowReader>>;

    /// Insert a batch of observations in one statement, retrying from
    /// `attempt`. Returns the number of rows the store reported.
    async fn insert_observation_batch(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        observations: &[Observation],
        dimension_ids: &HashMap<OptionKey, String>,
    ) -> GraphResult<i64>;
}

/// The selection a filter translates to. Dimensions without options are
/// left out entirely.
pub fn selected_dimensions(filter: Option<&DimensionFilters>) -> Vec<SelectedDimension> {
    let Some(filter) = filter else {
        return Vec::new();
    };
    filter
        .active()
        .into_iter()
        .map(|d| SelectedDimension {
            name: d.name.clone(),
            options: d.options.clone(),
        })
        .collect()
}

/// Resolve each observation's options to store node ids.
pub fn observation_records(
    instance_id: &str,
    observations: &[Observation],
    dimension_ids: &HashMap<OptionKey, String>,
) -> GraphResult<Vec<ObservationRecord>> {
    observations
        .iter()
        .map(|obs| {
            let option_ids = obs
                .dimension_options
                .iter()
                .map(|opt| {
                    let key = OptionKey::new(instance_id, opt.dimension_name.as_str(), opt.option.as_str());
                    dimension_ids.get(&key).cloned().ok_or_else(|| {
                        GraphError::invalid_input(format!(
                            "no node id for option '{}' of dimension '{}' in instance '{}'",
                            opt.option, opt.dimension_name, instance_id
                        ))
                    })
                })
                .collect::<GraphResult<Vec<_>>>()?;

            Ok(ObservationRecord {
                value: obs.row.clone(),
                row_index: obs.row_index,
                option_ids,
            })
        })
        .collect()
}

#[async_trait]
impl ObservationStore for GraphDb {
    async fn stream_csv_rows(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        filter_id: &str,
        filter: Option<&DimensionFilters>,
        limit: Option<i64>,
    ) -> GraphResult<Box<dyn RowReader>> {
        require(instance_id, "instance id")?;
        if let Some(l) = limit {
            if l < 0 {
                return Err(GraphError::invalid_input("limit must not be negative"));
            }
        }

        let dimensions = selected_dimensions(filter);
        info!(
            instance_id,
            filter_id,
            dimensions = dimensions.len(),
            limit,
            "Streaming observation rows"
        );

        let statement = Statement::StreamCsvRows {
            instance_id: instance_id.to_string(),
            dimensions,
            limit,
        };
        let cursor = self.cursor(cancel, &statement).await?;
        Ok(Box::new(StreamRowReader::new(cursor)))
    }

    async fn insert_observation_batch(
        &self,
        cancel: &CancelToken,
        attempt: u32,
        instance_id: &str,
        observations: &[Observation],
        dimension_ids: &HashMap<OptionKey, String>,
    ) -> GraphResult<i64> {
        require(instance_id, "instance id")?;
        if observations.is_empty() {
            return Ok(0);
        }

        let records = observation_records(instance_id, observations, dimension_ids)?;
        let expected = records.len() as i64;
        let statement = Statement::InsertObservations {
            instance_id: instance_id.to_string(),
            records,
        };

        let affected = self.write(cancel, attempt, &statement).await?;
        if affected != expected {
            warn!(instance_id, expected, affected, "Observation batch rows affected mismatch");
        } else {
            info!(instance_id, affected, "Observation batch inserted");
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use statgraph_core::model::{ConstraintCache, Dimension, DimensionFilter, Instance};
    use statgraph_core::StoreConfig;

    use crate::dimension::DimensionStore;
    use crate::instance::InstanceStore;
    use crate::memory::MemoryStore;
    use crate::reader::CompositeRowReader;

    const INSTANCE: &str = "inst";

    async fn drain(reader: &mut dyn RowReader) -> Vec<String> {
        let mut rows = Vec::new();
        while let Some(row) = reader.read().await.unwrap() {
            rows.push(row);
        }
        reader.close().await.unwrap();
        rows
    }

    /// Three observations over age x sex, with their option ids resolved.
    async fn setup() -> (Arc<MemoryStore>, GraphDb) {
        let store = Arc::new(MemoryStore::new());
        let mut config = StoreConfig::memory();
        config.retry.base_delay_ms = 1;
        let db = GraphDb::new(store.clone(), config);
        let cancel = CancelToken::new();

        let instance = Instance::new(INSTANCE, vec!["v4_0".into(), "age".into(), "sex".into()]);
        db.create_instance(&cancel, &instance).await.unwrap();

        let mut cache = ConstraintCache::new();
        let mut ids = HashMap::new();
        for (dim, option) in [("age", "29"), ("age", "30"), ("age", "31"), ("sex", "male"), ("sex", "female")] {
            let inserted = db
                .insert_dimension(&cancel, &mut cache, INSTANCE, &Dimension::new(dim, option))
                .await
                .unwrap();
            ids.insert(OptionKey::new(INSTANCE, dim, option), inserted.node_id.unwrap());
        }

        let observations = vec![
            Observation::new("10,29,male", 2).with_option("age", "29").with_option("sex", "male"),
            Observation::new("11,30,female", 0).with_option("age", "30").with_option("sex", "female"),
            Observation::new("12,31,male", 1).with_option("age", "31").with_option("sex", "male"),
        ];
        let inserted = db
            .insert_observation_batch(&cancel, 1, INSTANCE, &observations, &ids)
            .await
            .unwrap();
        assert_eq!(inserted, 3);
        (store, db)
    }

    #[tokio::test]
    async fn test_unfiltered_stream_is_header_then_all_rows() {
        let (_, db) = setup().await;
        let mut reader = db
            .stream_csv_rows(&CancelToken::new(), INSTANCE, "f1", None, None)
            .await
            .unwrap();

        let rows = drain(reader.as_mut()).await;
        assert_eq!(rows, vec!["v4_0,age,sex\n", "11,30,female\n", "12,31,male\n", "10,29,male\n"]);
    }

    #[tokio::test]
    async fn test_empty_options_dimension_is_omitted() {
        let (_, db) = setup().await;
        let filter = DimensionFilters::new(vec![
            DimensionFilter::new("age", ["29", "30"]),
            DimensionFilter::new("sex", Vec::<String>::new()),
        ]);

        let selection = selected_dimensions(Some(&filter));
        assert_eq!(selection.len(), 1);
        assert_eq!(selection[0].name, "age");

        let mut reader = db
            .stream_csv_rows(&CancelToken::new(), INSTANCE, "f2", Some(&filter), None)
            .await
            .unwrap();
        let rows = drain(reader.as_mut()).await;
        assert_eq!(rows, vec!["v4_0,age,sex\n", "11,30,female\n", "10,29,male\n"]);
    }

    #[tokio::test]
    async fn test_dimensions_are_combined_with_and() {
        let (_, db) = setup().await;
        let filter = DimensionFilters::new(vec![
            DimensionFilter::new("age", ["29", "30"]),
            DimensionFilter::new("sex", ["male"]),
        ]);

        let mut reader = db
            .stream_csv_rows(&CancelToken::new(), INSTANCE, "f3", Some(&filter), None)
            .await
            .unwrap();
        assert_eq!(drain(reader.as_mut()).await, vec!["v4_0,age,sex\n", "10,29,male\n"]);
    }

    #[tokio::test]
    async fn test_limit_applies_to_data_rows() {
        let (_, db) = setup().await;
        let mut reader = db
            .stream_csv_rows(&CancelToken::new(), INSTANCE, "f4", None, Some(1))
            .await
            .unwrap();
        assert_eq!(drain(reader.as_mut()).await, vec!["v4_0,age,sex\n", "11,30,female\n"]);
    }

    #[tokio::test]
    async fn test_stream_readers_compose() {
        let (_, db) = setup().await;
        let cancel = CancelToken::new();
        let first = db.stream_csv_rows(&cancel, INSTANCE, "a", None, Some(0)).await.unwrap();
        let second = db.stream_csv_rows(&cancel, INSTANCE, "b", None, Some(1)).await.unwrap();

        let mut reader = CompositeRowReader::new(vec![first, second]);
        assert_eq!(
            drain(&mut reader).await,
            vec!["v4_0,age,sex\n", "v4_0,age,sex\n", "11,30,female\n"]
        );
    }

    #[tokio::test]
    async fn test_missing_option_id_is_invalid_input() {
        let (store, db) = setup().await;
        let before = store.calls("insert_observations");

        let observations = vec![Observation::new("13,32,male", 3).with_option("age", "32")];
        let err = db
            .insert_observation_batch(&CancelToken::new(), 1, INSTANCE, &observations, &HashMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GraphError::InvalidInput(_)));
        assert_eq!(store.calls("insert_observations"), before);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_store() {
        let (store, db) = setup().await;
        let before = store.calls("insert_observations");
        let n = db
            .insert_observation_batch(&CancelToken::new(), 1, INSTANCE, &[], &HashMap::new())
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.calls("insert_observations"), before);
    }

    #[tokio::test]
    async fn test_transient_insert_failure_is_retried() {
        let (store, db) = setup().await;
        let before = store.calls("insert_observations");
        store.fail_next(statgraph_core::StoreError::new("leader switch"));

        let observations = vec![Observation::new("14,29,female", 4)];
        let n = db
            .insert_observation_batch(&CancelToken::new(), 1, INSTANCE, &observations, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.calls("insert_observations") - before, 2);
    }

    #[tokio::test]
    async fn test_retry_budget_counts_from_given_attempt() {
        let (store, db) = setup().await;
        for _ in 0..5 {
            store.fail_next(statgraph_core::StoreError::new("timeout"));
        }

        let observations = vec![Observation::new("15,30,male", 5)];
        let err = db
            .insert_observation_batch(&CancelToken::new(), 4, INSTANCE, &observations, &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), Some(5));
    }
}

//! Concurrent batch execution.
//!
//! Large id/value sets are cut into fixed-size batches and processed by a
//! bounded number of concurrent tasks. Results are merged into a set and
//! every batch error is collected; one failing batch never stops the others.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use statgraph_core::{GraphError, GraphResult};
use tokio::sync::Semaphore;
use tracing::debug;

/// Merged output of a batched run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Unordered union of every batch's results.
    pub items: HashSet<String>,
    pub errors: Vec<GraphError>,
}

impl BatchOutcome {
    /// Collapse into a result, failing if any batch failed.
    pub fn into_result(mut self) -> GraphResult<HashSet<String>> {
        if self.errors.is_empty() {
            return Ok(self.items);
        }
        let failed = self.errors.len();
        let first = self.errors.swap_remove(0);
        Err(GraphError::BatchFailures {
            failed,
            first: Box::new(first),
        })
    }
}

/// Split `items` into contiguous batches of `batch_size`; only the last may be
/// shorter. A zero batch size is treated as one.
pub fn split_batches<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    items.chunks(batch_size.max(1)).map(<[T]>::to_vec).collect()
}

/// Run `process` over every batch with at most `max_workers` in flight.
pub async fn process_in_concurrent_batches<F, Fut>(
    items: Vec<String>,
    batch_size: usize,
    max_workers: usize,
    process: F,
) -> BatchOutcome
where
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = GraphResult<Vec<String>>> + Send + 'static,
{
    let batches = split_batches(&items, batch_size);
    let total = batches.len();
    debug!(items = items.len(), batches = total, max_workers, "Processing in concurrent batches");

    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let merged = Arc::new(Mutex::new(BatchOutcome::default()));
    let process = Arc::new(process);

    let mut handles = Vec::with_capacity(total);
    for (index, batch) in batches.into_iter().enumerate() {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let merged = merged.clone();
        let process = process.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let result = process(batch).await;

            let mut outcome = merged.lock().unwrap_or_else(|e| e.into_inner());
            match result {
                Ok(found) => outcome.items.extend(found),
                Err(err) => {
                    debug!(batch = index, error = %err, "Batch failed");
                    outcome.errors.push(err);
                }
            }
        }));
    }

    let mut join_errors = Vec::new();
    for joined in futures::future::join_all(handles).await {
        if let Err(e) = joined {
            join_errors.push(GraphError::Internal(format!("batch task failed: {}", e)));
        }
    }

    let mut outcome = match Arc::try_unwrap(merged) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
        Err(shared) => {
            let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        }
    };
    outcome.errors.extend(join_errors);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id-{i}")).collect()
    }

    #[test]
    fn test_split_batches_preserves_order_and_sizes() {
        let items = ids(10);
        let batches = split_batches(&items, 3);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 3, 1]);
        assert_eq!(batches.concat(), items);

        let exact = split_batches(&ids(9), 3);
        assert_eq!(exact.last().map(Vec::len), Some(3));

        assert!(split_batches::<String>(&[], 3).is_empty());
        assert_eq!(split_batches(&ids(2), 0).len(), 2);
    }

    #[tokio::test]
    async fn test_merge_is_set_union() {
        let outcome = process_in_concurrent_batches(ids(25), 4, 3, |batch| async move {
            // Every batch reports its items plus a shared duplicate.
            let mut out = batch;
            out.push("shared".to_string());
            Ok(out)
        })
        .await;

        assert!(outcome.errors.is_empty());
        let mut expected: HashSet<String> = ids(25).into_iter().collect();
        expected.insert("shared".to_string());
        assert_eq!(outcome.items, expected);
    }

    #[tokio::test]
    async fn test_errors_are_collected_not_fail_fast() {
        let outcome = process_in_concurrent_batches(ids(10), 2, 2, |batch| async move {
            if batch.contains(&"id-2".to_string()) || batch.contains(&"id-8".to_string()) {
                Err(GraphError::Internal("boom".into()))
            } else {
                Ok(batch)
            }
        })
        .await;

        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.items.len(), 6);

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, GraphError::BatchFailures { failed: 2, .. }));
    }

    #[tokio::test]
    async fn test_worker_limit_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (current, max_seen) = (in_flight.clone(), peak.clone());
        let outcome = process_in_concurrent_batches(ids(40), 2, 3, move |batch| {
            let current = current.clone();
            let max_seen = max_seen.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(batch)
            }
        })
        .await;

        assert_eq!(outcome.items.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_empty_input_runs_nothing() {
        let outcome = process_in_concurrent_batches(Vec::new(), 10, 2, |_| async {
            Err(GraphError::Internal("should not run".into()))
        })
        .await;
        assert!(outcome.items.is_empty());
        assert!(outcome.errors.is_empty());
    }
}

//! The store handle.
//!
//! [`GraphDb`] is constructed once at startup around a chosen backend and
//! passed to every caller. All store round-trips go through its retrying
//! helpers, so classification and backoff are applied uniformly.

use std::sync::Arc;

use statgraph_core::{GraphError, GraphResult, StoreConfig};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error_consumer::ErrorReport;
use crate::retry::RetryPolicy;
use crate::statement::Statement;
use crate::store::{ErrorClass, GraphStore, RecordCursor, Row};

/// Shared handle to a graph store backend.
#[derive(Clone)]
pub struct GraphDb {
    store: Arc<dyn GraphStore>,
    config: Arc<StoreConfig>,
    retry: RetryPolicy,
    errors: Option<mpsc::Sender<ErrorReport>>,
}

impl GraphDb {
    pub fn new(store: Arc<dyn GraphStore>, config: StoreConfig) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            store,
            config: Arc::new(config),
            retry,
            errors: None,
        }
    }

    /// Forward final store failures to `sender` without blocking callers.
    pub fn with_error_reporting(mut self, sender: mpsc::Sender<ErrorReport>) -> Self {
        self.errors = Some(sender);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Retry classification: store errors are judged by the backend, local
    /// errors are never retried.
    pub fn classify(&self, err: &GraphError) -> ErrorClass {
        match err {
            GraphError::Store(e) => self.store.classify_error(e),
            _ => ErrorClass::NonTransient,
        }
    }

    fn report(&self, statement: &Statement, err: &GraphError) {
        if let Some(tx) = &self.errors {
            let report = ErrorReport {
                statement: statement.name(),
                attempt: err.attempts(),
                error: err.clone(),
            };
            if tx.try_send(report).is_err() {
                debug!(statement = statement.name(), "Error channel full or closed, dropping report");
            }
        }
    }

    fn finish<T>(&self, statement: &Statement, result: GraphResult<T>) -> GraphResult<T> {
        if let Err(err) = &result {
            if !err.is_cancelled() {
                self.report(statement, err);
            }
        }
        result
    }

    /// Execute a write, retrying from `attempt`.
    pub async fn write(&self, cancel: &CancelToken, attempt: u32, statement: &Statement) -> GraphResult<i64> {
        let result = self
            .retry
            .run(cancel, attempt, |e| self.classify(e), |attempt| async move {
                debug!(statement = statement.name(), attempt, "Executing write");
                Ok(self.store.execute_write(statement).await?)
            })
            .await;
        self.finish(statement, result)
    }

    /// Run a read and collect its rows.
    pub async fn read(&self, cancel: &CancelToken, statement: &Statement) -> GraphResult<Vec<Row>> {
        let result = self
            .retry
            .run(cancel, 1, |e| self.classify(e), |attempt| async move {
                debug!(statement = statement.name(), attempt, "Executing read");
                Ok(self.store.query(statement).await?)
            })
            .await;
        self.finish(statement, result)
    }

    /// Run a read expecting exactly one row.
    pub async fn read_one(&self, cancel: &CancelToken, statement: &Statement, what: &str) -> GraphResult<Row> {
        let mut rows = self.read(cancel, statement).await?;
        match rows.len() {
            0 => Err(GraphError::not_found(what.to_string())),
            1 => Ok(rows.remove(0)),
            n => Err(GraphError::multiple_found(format!("{} ({} results)", what, n))),
        }
    }

    pub async fn count(&self, cancel: &CancelToken, statement: &Statement) -> GraphResult<i64> {
        let result = self
            .retry
            .run(cancel, 1, |e| self.classify(e), |attempt| async move {
                debug!(statement = statement.name(), attempt, "Executing count");
                Ok(self.store.query_count(statement).await?)
            })
            .await;
        self.finish(statement, result)
    }

    pub async fn cursor(&self, cancel: &CancelToken, statement: &Statement) -> GraphResult<Box<dyn RecordCursor>> {
        let result = self
            .retry
            .run(cancel, 1, |e| self.classify(e), |attempt| async move {
                debug!(statement = statement.name(), attempt, "Opening cursor");
                Ok(self.store.open_cursor(statement).await?)
            })
            .await;
        self.finish(statement, result)
    }
}

/// Fail fast on a blank identifier before any store call.
pub(crate) fn require(value: &str, what: &str) -> GraphResult<()> {
    if value.trim().is_empty() {
        return Err(GraphError::invalid_input(format!("{} must not be empty", what)));
    }
    Ok(())
}

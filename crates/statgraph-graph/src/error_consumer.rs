//! Background consumer for store errors reported through
//! [`GraphDb::with_error_reporting`](crate::GraphDb::with_error_reporting).

use statgraph_core::{GraphError, GraphResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// A final store failure, with the statement and attempt it failed on.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub statement: &'static str,
    /// Attempt the retry layer gave up on; `None` for local errors.
    pub attempt: Option<u32>,
    pub error: GraphError,
}

pub struct ErrorConsumer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<usize>,
}

impl ErrorConsumer {
    /// Handle every error received on `errors` until [`close`](Self::close).
    pub fn spawn<H>(mut errors: mpsc::Receiver<ErrorReport>, mut handler: H) -> Self
    where
        H: FnMut(ErrorReport) + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut handled = 0;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    received = errors.recv() => match received {
                        Some(err) => {
                            handler(err);
                            handled += 1;
                        }
                        None => return handled,
                    },
                }
            }
            // Queued reports are still delivered after close.
            while let Ok(err) = errors.try_recv() {
                handler(err);
                handled += 1;
            }
            handled
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// Stop consuming. Returns how many errors were handled.
    pub async fn close(mut self) -> GraphResult<usize> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let handled = self
            .task
            .await
            .map_err(|e| GraphError::Internal(format!("error consumer task failed: {e}")))?;
        debug!(handled, "Error consumer closed");
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use statgraph_core::{StoreConfig, StoreError};

    use crate::cancel::CancelToken;
    use crate::memory::MemoryStore;
    use crate::statement::Statement;
    use crate::GraphDb;

    #[tokio::test]
    async fn test_consumer_drains_until_closed() {
        let (tx, rx) = mpsc::channel(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer = ErrorConsumer::spawn(rx, move |r: ErrorReport| sink.lock().unwrap().push(r.error.to_string()));

        for message in ["one", "two"] {
            tx.send(ErrorReport {
                statement: "ping",
                attempt: None,
                error: GraphError::Internal(message.into()),
            })
            .await
            .unwrap();
        }

        assert_eq!(consumer.close().await.unwrap(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_final_store_failures_are_reported() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(8);
        let db = GraphDb::new(store.clone(), StoreConfig::memory()).with_error_reporting(tx);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer = ErrorConsumer::spawn(rx, move |r| sink.lock().unwrap().push(r));

        store.fail_next(StoreError::new("malformed request: bad statement"));
        assert!(db.read(&CancelToken::new(), &Statement::Ping).await.is_err());
        assert!(db.read(&CancelToken::new(), &Statement::Ping).await.is_ok());

        assert_eq!(consumer.close().await.unwrap(), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].statement, Statement::Ping.name());
        assert_eq!(seen[0].attempt, Some(1));
        assert!(matches!(seen[0].error, GraphError::NonRetriable { attempt: 1, .. }));
        assert!(matches!(seen[0].error.root_cause(), GraphError::Store(e) if e.message.contains("malformed request")));
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempt_count() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(8);
        let mut config = StoreConfig::memory();
        config.retry.max_attempts = 2;
        config.retry.base_delay_ms = 1;
        let db = GraphDb::new(store.clone(), config).with_error_reporting(tx);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer = ErrorConsumer::spawn(rx, move |r| sink.lock().unwrap().push(r));

        store.fail_next(StoreError::new("connection reset"));
        store.fail_next(StoreError::new("connection reset"));
        assert!(db.count(&CancelToken::new(), &Statement::Ping).await.is_err());

        assert_eq!(consumer.close().await.unwrap(), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].attempt, Some(2));
        assert!(matches!(seen[0].error, GraphError::AttemptsExceeded { attempts: 2, .. }));
    }
}

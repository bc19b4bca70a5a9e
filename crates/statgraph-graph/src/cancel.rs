//! Cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// A cloneable cancellation signal shared by every call of one request.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// A token that cancels itself after `timeout`.
    pub fn with_deadline(timeout: Duration) -> Self {
        let token = Self::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            trigger.cancel();
        });
        token
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The sender lives as long as any clone of the token, including self.
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

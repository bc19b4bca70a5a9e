//! Driver lifecycle: close, healthcheck and liveness reporting.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use statgraph_core::{GraphError, GraphResult};
use tracing::{info, warn};

use crate::db::GraphDb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    Ok,
    Critical,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Liveness state handed to a health-check aggregator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckState {
    pub name: String,
    pub status: Option<CheckStatus>,
    pub message: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl CheckState {
    fn record(&mut self, name: &str, result: &GraphResult<()>) {
        let now = Utc::now();
        self.name = name.to_string();
        self.last_checked = Some(now);
        match result {
            Ok(()) => {
                self.status = Some(CheckStatus::Ok);
                self.message = format!("{} is ok", name);
                self.last_success = Some(now);
            }
            Err(e) => {
                self.status = Some(CheckStatus::Critical);
                self.message = e.to_string();
                self.last_failure = Some(now);
            }
        }
    }
}

impl GraphDb {
    /// Ping the backend within the configured healthcheck timeout.
    pub async fn healthcheck(&self) -> (&'static str, GraphResult<()>) {
        let name = self.store().name();
        let timeout = self.config().healthcheck_timeout();
        let result = match tokio::time::timeout(timeout, self.store().healthcheck()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GraphError::Store(e)),
            Err(_) => Err(GraphError::Internal(format!(
                "healthcheck timed out after {}ms",
                timeout.as_millis()
            ))),
        };
        (name, result)
    }

    pub async fn checker(&self, state: &mut CheckState) {
        let (name, result) = self.healthcheck().await;
        if let Err(e) = &result {
            warn!(backend = name, error = %e, "Graph healthcheck failed");
        }
        state.record(name, &result);
    }

    pub async fn close(&self) -> GraphResult<()> {
        self.store().close().await?;
        info!(backend = self.store().name(), "Graph store closed");
        Ok(())
    }
}

//! Store configuration.
//!
//! Defaults suit a local Neo4j; every value can be overridden from a TOML
//! document or from environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GraphError, GraphResult};

/// Which graph store backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Neo4j,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neo4j => "neo4j",
            Self::Memory => "memory",
        }
    }

}

impl FromStr for BackendKind {
    type Err = GraphError;

    fn from_str(s: &str) -> GraphResult<Self> {
        match s.to_lowercase().as_str() {
            "neo4j" => Ok(Self::Neo4j),
            "memory" | "mem" => Ok(Self::Memory),
            _ => Err(GraphError::Config(format!("unknown graph driver type '{}'", s))),
        }
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: usize,
    pub fetch_size: usize,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
            database: "neo4j".to_string(),
            pool_size: 30,
            fetch_size: 500,
        }
    }
}

/// Retry budget applied to every store call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 20,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Sizing for batched fan-out steps.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_workers: 10,
        }
    }
}

/// Top-level configuration for a graph store handle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub neo4j: Neo4jConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub healthcheck_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Neo4j,
            neo4j: Neo4jConfig::default(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            healthcheck_timeout_ms: 2_000,
        }
    }
}

impl StoreConfig {
    /// Configuration for the in-process backend.
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> GraphResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build from defaults overridden by environment variables.
    pub fn from_env() -> GraphResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults overridden by an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> GraphResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("GRAPH_DRIVER_TYPE") {
            config.backend = v.parse()?;
        }
        if let Some(v) = lookup("GRAPH_ADDR") {
            config.neo4j.uri = v;
        }
        if let Some(v) = lookup("GRAPH_USER") {
            config.neo4j.user = v;
        }
        if let Some(v) = lookup("GRAPH_PASSWORD") {
            config.neo4j.password = v;
        }
        if let Some(v) = lookup("GRAPH_DATABASE") {
            config.neo4j.database = v;
        }
        if let Some(v) = lookup("GRAPH_POOL_SIZE") {
            config.neo4j.pool_size = parse_number("GRAPH_POOL_SIZE", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            config.retry.max_attempts = parse_number("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RETRY_BASE_DELAY_MS") {
            config.retry.base_delay_ms = parse_number("RETRY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("BATCH_SIZE") {
            config.batch.batch_size = parse_number("BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("BATCH_MAX_WORKERS") {
            config.batch.max_workers = parse_number("BATCH_MAX_WORKERS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the executors cannot work with.
    pub fn validate(&self) -> GraphResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(GraphError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.batch.batch_size == 0 {
            return Err(GraphError::Config("batch.batch_size must be at least 1".into()));
        }
        if self.batch.max_workers == 0 {
            return Err(GraphError::Config("batch.max_workers must be at least 1".into()));
        }
        if self.backend == BackendKind::Neo4j && self.neo4j.pool_size == 0 {
            return Err(GraphError::Config("neo4j.pool_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn healthcheck_timeout(&self) -> Duration {
        Duration::from_millis(self.healthcheck_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> GraphResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GraphError::Config(format!("{} must be a number, got '{}'", key, value)))
}

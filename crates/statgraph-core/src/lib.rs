//! # Statgraph Core
//!
//! Domain models, error types and configuration shared by the
//! statgraph graph-store access layer.

pub mod config;
pub mod error;
pub mod model;

pub use config::{BackendKind, BatchConfig, Neo4jConfig, RetryConfig, StoreConfig};
pub use error::{GraphError, GraphResult, StoreError, StreamError};

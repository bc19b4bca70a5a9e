//! # Statgraph Neo4j
//!
//! Neo4j backend for statgraph: renders statements as Cypher and runs them
//! over a neo4rs connection pool. Also home of [`connect`], which picks the
//! backend named in the configuration.

pub mod client;
pub mod cursor;
pub mod cypher;
pub mod labels;

use std::sync::Arc;

use anyhow::{Context, Result};
use statgraph_core::{BackendKind, StoreConfig};
use statgraph_graph::{GraphDb, MemoryStore};
use tracing::info;

pub use client::Neo4jStore;
pub use cursor::Neo4jCursor;
pub use cypher::{render, CypherQuery};

/// Validate `config` and build the store handle for its backend.
pub async fn connect(config: StoreConfig) -> Result<GraphDb> {
    config.validate().context("Invalid graph store configuration")?;

    let db = match config.backend {
        BackendKind::Memory => GraphDb::new(Arc::new(MemoryStore::new()), config),
        BackendKind::Neo4j => {
            let store = Neo4jStore::connect(&config.neo4j)
                .await
                .with_context(|| format!("Failed to connect to Neo4j at {}", config.neo4j.uri))?;
            GraphDb::new(Arc::new(store), config)
        }
    };

    info!(backend = db.store().name(), "Graph store ready");
    Ok(db)
}

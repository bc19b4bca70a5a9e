//! Tracing setup for binaries embedding the access layer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stdout subscriber filtered by `RUST_LOG`, defaulting to
/// `statgraph=info`. Does nothing if a global subscriber already exists.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "statgraph=info,statgraph_graph=info,statgraph_neo4j=info".into());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

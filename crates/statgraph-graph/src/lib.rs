//! # Statgraph Graph
//!
//! Graph store contract and the operations built on it: the instance
//! hierarchy pipeline, observation streaming and insertion, dimension
//! options, instances and code lists.
//!
//! Every operation is implemented once on [`GraphDb`] against the
//! backend-neutral [`Statement`] set, with retry and batching applied
//! uniformly. Backends implement [`GraphStore`].

pub mod batch;
pub mod cancel;
pub mod codelist;
pub mod db;
pub mod dimension;
pub mod driver;
pub mod error_consumer;
pub mod hierarchy;
pub mod instance;
pub mod memory;
pub mod observation;
pub mod reader;
pub mod retry;
pub mod statement;
pub mod store;
pub mod telemetry;

pub use batch::{process_in_concurrent_batches, split_batches, BatchOutcome};
pub use cancel::CancelToken;
pub use codelist::CodeListStore;
pub use db::GraphDb;
pub use dimension::DimensionStore;
pub use driver::{CheckState, CheckStatus};
pub use error_consumer::{ErrorConsumer, ErrorReport};
pub use hierarchy::{BuildReport, HierarchyBuild, HierarchyStore};
pub use instance::InstanceStore;
pub use memory::MemoryStore;
pub use observation::ObservationStore;
pub use reader::{CompositeRowReader, RowReader, StreamRowReader};
pub use retry::RetryPolicy;
pub use statement::{ObservationRecord, SelectedDimension, Statement};
pub use store::{ErrorClass, GraphStore, RecordCursor, Row, Value};
pub use telemetry::init_tracing;

/// Every capability at once, for callers that need the whole surface.
pub trait FullGraphStore:
    CodeListStore + HierarchyStore + InstanceStore + DimensionStore + ObservationStore
{
}

impl<T> FullGraphStore for T where
    T: CodeListStore + HierarchyStore + InstanceStore + DimensionStore + ObservationStore
{
}

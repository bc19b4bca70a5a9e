//! In-process graph store.
//!
//! Interprets [`Statement`]s directly against an in-memory property graph.
//! Used for development without a database and as the backend for the
//! scenario tests: it records every statement it receives and can be told
//! to fail the next N calls.

mod graph;

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use statgraph_core::StoreError;
use tracing::debug;

use crate::statement::Statement;
use crate::store::{GraphStore, RecordCursor, Row};

pub use graph::MemoryHierarchyNode;
use graph::{CodeEntry, CodeListEntry, MemoryGraph, Outcome};

#[derive(Default)]
pub struct MemoryStore {
    graph: Mutex<MemoryGraph>,
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<VecDeque<StoreError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn wrong_kind(statement: &Statement, expected: &str) -> StoreError {
    StoreError::new(format!(
        "invalid request arguments: statement '{}' cannot be used as a {}",
        statement.name(),
        expected
    ))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- seeding ----------------------------------------------------------

    pub fn add_code_list(&self, id: &str, edition: &str, label: &str, flags: &[&str]) {
        lock(&self.graph).code_lists.push(CodeListEntry {
            id: id.to_string(),
            edition: edition.to_string(),
            label: label.to_string(),
            flags: flags.iter().map(|f| f.to_string()).collect(),
        });
    }

    pub fn add_code(&self, code_list_id: &str, edition: &str, code: &str, label: &str, order: Option<i64>) {
        lock(&self.graph).codes.push(CodeEntry {
            code_list_id: code_list_id.to_string(),
            edition: edition.to_string(),
            code: code.to_string(),
            label: label.to_string(),
            order,
        });
    }

    /// Add a node to a code list's generic hierarchy. Returns its node id.
    pub fn add_generic_node(&self, code_list_id: &str, code: &str, label: &str, order: Option<i64>) -> String {
        lock(&self.graph).add_generic_node(code_list_id, code, label, order)
    }

    /// Add a generic `hasParent` edge between two codes of a code list.
    pub fn set_generic_parent(&self, code_list_id: &str, child_code: &str, parent_code: &str) -> Result<(), StoreError> {
        let mut graph = lock(&self.graph);
        let child = graph
            .generic_id_for_code(code_list_id, child_code)
            .ok_or_else(|| StoreError::new(format!("no generic node for code '{}'", child_code)))?;
        let parent = graph
            .generic_id_for_code(code_list_id, parent_code)
            .ok_or_else(|| StoreError::new(format!("no generic node for code '{}'", parent_code)))?;

        if let Some(node) = graph.generic.get_mut(code_list_id).and_then(|n| n.get_mut(&child)) {
            node.parents.insert(parent);
        }
        Ok(())
    }

    // -- inspection -------------------------------------------------------

    /// Every node of an instance hierarchy, ordered by code.
    pub fn hierarchy_snapshot(&self, instance_id: &str, dimension: &str) -> Vec<MemoryHierarchyNode> {
        let graph = lock(&self.graph);
        let mut nodes: Vec<MemoryHierarchyNode> = graph
            .hierarchies
            .get(&(instance_id.to_string(), dimension.to_string()))
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default();
        nodes.sort_by(|a, b| a.code.cmp(&b.code));
        nodes
    }

    pub fn constraints(&self) -> BTreeSet<String> {
        lock(&self.graph).constraints.clone()
    }

    /// Number of times a statement with this name was received.
    pub fn calls(&self, name: &str) -> usize {
        lock(&self.calls).iter().filter(|c| **c == name).count()
    }

    pub fn statement_log(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    /// Fail the next call with `err`. Queued failures are used in order.
    pub fn fail_next(&self, err: StoreError) {
        lock(&self.failures).push_back(err);
    }

    fn run(&self, statement: &Statement) -> Result<Outcome, StoreError> {
        lock(&self.calls).push(statement.name());

        if let Some(err) = lock(&self.failures).pop_front() {
            debug!(statement = statement.name(), error = %err, "Injected failure");
            return Err(err);
        }

        lock(&self.graph).apply(statement)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute_write(&self, statement: &Statement) -> Result<i64, StoreError> {
        match self.run(statement)? {
            Outcome::Affected(n) => Ok(n),
            _ => Err(wrong_kind(statement, "write")),
        }
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        match self.run(statement)? {
            Outcome::Rows(rows) => Ok(rows),
            _ => Err(wrong_kind(statement, "query")),
        }
    }

    async fn query_count(&self, statement: &Statement) -> Result<i64, StoreError> {
        match self.run(statement)? {
            Outcome::Count(n) => Ok(n),
            _ => Err(wrong_kind(statement, "count")),
        }
    }

    async fn open_cursor(&self, statement: &Statement) -> Result<Box<dyn RecordCursor>, StoreError> {
        match self.run(statement)? {
            Outcome::Rows(rows) => Ok(Box::new(MemoryCursor {
                rows: rows.into(),
                closed: false,
            })),
            _ => Err(wrong_kind(statement, "cursor")),
        }
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        self.query(&Statement::Ping).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Cursor over a materialized result.
struct MemoryCursor {
    rows: VecDeque<Row>,
    closed: bool,
}

#[async_trait]
impl RecordCursor for MemoryCursor {
    async fn next_record(&mut self) -> Result<Option<Row>, StoreError> {
        if self.closed {
            return Err(StoreError::new("cursor is closed"));
        }
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ErrorClass;

    #[tokio::test]
    async fn test_wrong_statement_kind_is_rejected() {
        let store = MemoryStore::new();
        let err = store.execute_write(&Statement::Ping).await.unwrap_err();
        assert_eq!(store.classify_error(&err), ErrorClass::NonTransient);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let store = MemoryStore::new();
        store.fail_next(StoreError::new("timeout"));

        assert!(store.healthcheck().await.is_err());
        assert!(store.healthcheck().await.is_ok());
        assert_eq!(store.calls("ping"), 2);
    }

    #[tokio::test]
    async fn test_generic_parent_requires_known_codes() {
        let store = MemoryStore::new();
        store.add_generic_node("cl", "A", "Alpha", None);
        assert!(store.set_generic_parent("cl", "B", "A").is_err());
    }
}

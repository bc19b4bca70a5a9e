//! Neo4j backend over bolt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query};
use statgraph_core::{Neo4jConfig, StoreError};
use statgraph_graph::store::classify_by_message;
use statgraph_graph::{ErrorClass, GraphStore, RecordCursor, Row, Statement, Value};
use tracing::{debug, info};

use crate::cursor::Neo4jCursor;
use crate::cypher::{render, ColumnKind, CypherQuery, Param, QueryMode};

/// Neo4j error code family the server uses for malformed statements.
/// Schema codes such as constraint validation failures fall through to the
/// message rules and are retried.
const REJECTED_CODES: &[&str] = &["Neo.ClientError.Statement."];

/// [`GraphStore`] backed by a neo4rs connection pool.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Build the pool and run a `RETURN 1` ping.
    ///
    /// neo4rs creates its pool lazily, so the ping is what actually proves
    /// the server is reachable.
    pub async fn connect(config: &Neo4jConfig) -> Result<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.pool_size)
            .fetch_size(config.fetch_size)
            .build()
            .context("Failed to build Neo4j config")?;

        let graph = Graph::connect(neo4j_config)
            .context("Failed to create Neo4j connection pool")?;

        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .context("Neo4j is not responding to queries")?;

        info!(uri = %config.uri, database = %config.database, pool_size = config.pool_size, "Connected to Neo4j");
        Ok(Self { graph })
    }

    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    async fn rows(&self, query: &CypherQuery) -> Result<Vec<Row>, StoreError> {
        let mut stream = self.graph.execute(to_neo4rs(query)).await.map_err(store_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(store_error)? {
            rows.push(convert_row(&row, query.columns));
        }
        Ok(rows)
    }

    async fn single_int(&self, query: &CypherQuery, column: &str) -> Result<i64, StoreError> {
        let mut stream = self.graph.execute(to_neo4rs(query)).await.map_err(store_error)?;
        match stream.next().await.map_err(store_error)? {
            Some(row) => row
                .get::<i64>(column)
                .map_err(|e| StoreError::new(format!("failed to read column '{}': {}", column, e))),
            None => Ok(0),
        }
    }
}

pub(crate) fn to_neo4rs(query: &CypherQuery) -> Query {
    query
        .params
        .iter()
        .fold(Query::new(query.text.clone()), |q, (name, value)| match value {
            Param::Str(v) => q.param(name, v.clone()),
            Param::Int(v) => q.param(name, *v),
            Param::Bool(v) => q.param(name, *v),
            Param::StrList(v) => q.param(name, v.clone()),
            Param::IntList(v) => q.param(name, v.clone()),
            Param::StrLists(v) => q.param(name, v.clone()),
        })
}

/// Read the declared columns of a neo4rs row. Unreadable optional values
/// become nulls; an unreadable text column is kept as whatever scalar it
/// holds so the stream reader can report its type.
pub(crate) fn convert_row(row: &neo4rs::Row, columns: &[(&'static str, ColumnKind)]) -> Row {
    let mut out = Row::new();
    for (name, kind) in columns {
        let value = match kind {
            ColumnKind::Text => match row.get::<String>(name) {
                Ok(s) => Value::Str(s),
                Err(_) => scalar(row, name),
            },
            ColumnKind::OptText => row.get::<Option<String>>(name).ok().flatten().into(),
            ColumnKind::Int => match row.get::<i64>(name) {
                Ok(n) => Value::Int(n),
                Err(_) => scalar(row, name),
            },
            ColumnKind::OptInt => row.get::<Option<i64>>(name).ok().flatten().into(),
            ColumnKind::OptBool => row.get::<Option<bool>>(name).ok().flatten().into(),
        };
        out.push(name, value);
    }
    out
}

fn scalar(row: &neo4rs::Row, name: &str) -> Value {
    if let Ok(n) = row.get::<i64>(name) {
        return Value::Int(n);
    }
    if let Ok(f) = row.get::<f64>(name) {
        return Value::Float(f);
    }
    if let Ok(b) = row.get::<bool>(name) {
        return Value::Bool(b);
    }
    Value::Null
}

pub(crate) fn store_error(err: neo4rs::Error) -> StoreError {
    let message = err.to_string();
    match extract_code(&message) {
        Some(code) => StoreError::with_code(code, message),
        None => StoreError::new(message),
    }
}

/// Pull a `Neo.<Class>.<Category>.<Title>` status code out of an error text.
pub(crate) fn extract_code(message: &str) -> Option<String> {
    let start = message.find("Neo.")?;
    let code: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();
    let code = code.trim_end_matches('.');
    (code.matches('.').count() >= 3).then(|| code.to_string())
}

pub(crate) fn classify(err: &StoreError) -> ErrorClass {
    let rejected_code = err
        .code
        .as_deref()
        .is_some_and(|code| REJECTED_CODES.iter().any(|prefix| code.starts_with(prefix)));
    if rejected_code {
        return ErrorClass::NonTransient;
    }
    classify_by_message(&err.message)
}

#[async_trait]
impl GraphStore for Neo4jStore {
    fn name(&self) -> &'static str {
        "neo4j"
    }

    async fn execute_write(&self, statement: &Statement) -> Result<i64, StoreError> {
        let query = render(statement);
        debug!(statement = statement.name(), "Running cypher write");
        match query.mode {
            QueryMode::Schema => {
                self.graph.run(to_neo4rs(&query)).await.map_err(store_error)?;
                Ok(0)
            }
            QueryMode::Write => self.single_int(&query, "affected").await,
            QueryMode::Rows | QueryMode::Count => Err(StoreError::new(format!(
                "invalid request arguments: '{}' is not a write",
                statement.name()
            ))),
        }
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        let query = render(statement);
        debug!(statement = statement.name(), "Running cypher query");
        self.rows(&query).await
    }

    async fn query_count(&self, statement: &Statement) -> Result<i64, StoreError> {
        let query = render(statement);
        debug!(statement = statement.name(), "Running cypher count");
        self.single_int(&query, "count").await
    }

    async fn open_cursor(&self, statement: &Statement) -> Result<Box<dyn RecordCursor>, StoreError> {
        let query = render(statement);
        debug!(statement = statement.name(), "Opening cypher cursor");
        let stream = self.graph.execute(to_neo4rs(&query)).await.map_err(store_error)?;
        Ok(Box::new(Neo4jCursor::new(stream, query.columns)))
    }

    fn classify_error(&self, err: &StoreError) -> ErrorClass {
        classify(err)
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        self.graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .map_err(store_error)
    }

    /// The pool closes its connections when the last handle is dropped.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code() {
        assert_eq!(
            extract_code("Neo4j error `Neo.ClientError.Statement.SyntaxError`: Invalid input"),
            Some("Neo.ClientError.Statement.SyntaxError".to_string())
        );
        assert_eq!(extract_code("connection reset by peer"), None);
        assert_eq!(extract_code("Neo.partial"), None);
    }

    #[test]
    fn test_statement_errors_are_not_retried() {
        let syntax = StoreError::with_code("Neo.ClientError.Statement.SyntaxError", "bad query");
        let busy = StoreError::with_code("Neo.TransientError.Transaction.DeadlockDetected", "deadlock");

        assert_eq!(classify(&syntax), ErrorClass::NonTransient);
        assert_eq!(classify(&busy), ErrorClass::Transient);
    }

    #[test]
    fn test_constraint_contention_is_retried() {
        let raced = StoreError::with_code(
            "Neo.ClientError.Schema.ConstraintValidationFailed",
            "Node(12) already exists with label `_i_age` and property `value` = '30'",
        );
        assert_eq!(classify(&raced), ErrorClass::Transient);

        let lock = StoreError::with_code("Neo.TransientError.Transaction.LockClientStopped", "lock contention");
        assert_eq!(classify(&lock), ErrorClass::Transient);
    }

    #[test]
    fn test_message_classification_still_applies() {
        let err = StoreError::new("Invalid request arguments: unknown id");
        assert_eq!(classify(&err), ErrorClass::NonTransient);
        assert_eq!(classify(&StoreError::new("connection refused")), ErrorClass::Transient);
    }
}

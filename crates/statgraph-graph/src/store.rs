//! The graph store capability interface.
//!
//! A [`GraphStore`] executes [`Statement`]s and hands back backend-neutral
//! [`Row`]s. Connection pooling lives behind the trait; implementations must
//! be safe to call concurrently.

use async_trait::async_trait;
use statgraph_core::{GraphError, GraphResult, StoreError, StreamError};

use crate::statement::Statement;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row: ordered named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.columns.push((name.to_string(), value.into()));
        self
    }

    pub fn push(&mut self, name: &str, value: impl Into<Value>) {
        self.columns.push((name.to_string(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    fn required(&self, name: &str) -> GraphResult<&Value> {
        self.value(name)
            .ok_or_else(|| GraphError::Stream(StreamError::MissingColumn(name.to_string())))
    }

    pub fn get_str(&self, name: &str) -> GraphResult<String> {
        match self.required(name)? {
            Value::Str(s) => Ok(s.clone()),
            other => Err(unexpected(name, other)),
        }
    }

    pub fn get_opt_str(&self, name: &str) -> GraphResult<Option<String>> {
        match self.value(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(unexpected(name, other)),
        }
    }

    pub fn get_i64(&self, name: &str) -> GraphResult<i64> {
        match self.required(name)? {
            Value::Int(v) => Ok(*v),
            other => Err(unexpected(name, other)),
        }
    }

    pub fn get_opt_i64(&self, name: &str) -> GraphResult<Option<i64>> {
        match self.value(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(unexpected(name, other)),
        }
    }

    /// Missing or null booleans read as `false`.
    pub fn get_bool(&self, name: &str) -> GraphResult<bool> {
        match self.value(name) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(unexpected(name, other)),
        }
    }
}

fn unexpected(name: &str, value: &Value) -> GraphError {
    GraphError::Stream(StreamError::UnrecognisedType(format!(
        "column '{}' holds {}",
        name,
        value.type_name()
    )))
}

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    NonTransient,
}

/// Error text that marks a request the store rejected outright.
const NON_TRANSIENT_MARKERS: &[&str] = &["malformed request", "invalid request arguments"];

/// Substring classification shared by the backends. Anything not recognised
/// as a rejected request is assumed transient.
pub fn classify_by_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if NON_TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorClass::NonTransient
    } else {
        ErrorClass::Transient
    }
}

/// A forward-only cursor over query results.
#[async_trait]
pub trait RecordCursor: Send {
    /// Next record, or `None` once the cursor is exhausted.
    async fn next_record(&mut self) -> Result<Option<Row>, StoreError>;

    /// Release the cursor and its connection.
    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Capability interface every backend implements.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    /// Short backend name, reported by health checks.
    fn name(&self) -> &'static str;

    /// Run a write statement and return the number of affected entities.
    async fn execute_write(&self, statement: &Statement) -> Result<i64, StoreError>;

    /// Run a read statement and collect all rows.
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, StoreError>;

    /// Run a counting statement.
    async fn query_count(&self, statement: &Statement) -> Result<i64, StoreError>;

    /// Open a streaming cursor for a statement.
    async fn open_cursor(&self, statement: &Statement) -> Result<Box<dyn RecordCursor>, StoreError>;

    /// Decide whether a store error may succeed on retry.
    fn classify_error(&self, err: &StoreError) -> ErrorClass {
        classify_by_message(&err.message)
    }

    async fn healthcheck(&self) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

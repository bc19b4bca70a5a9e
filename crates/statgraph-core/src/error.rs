//! Centralized error types for statgraph.

use thiserror::Error;

/// An error reported by a graph store backend.
///
/// `code` carries the backend's own status code when it has one
/// (e.g. `Neo.ClientError.Statement.SyntaxError`).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct StoreError {
    pub code: Option<String>,
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Structural problems with a streamed row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("No data returned in this row")]
    NoDataReturned,

    #[error("Unrecognised type for row value: {0}")]
    UnrecognisedType(String),

    #[error("Missing column '{0}' in row")]
    MissingColumn(String),
}

/// Main error type for graph operations.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Multiple found: {0}")]
    MultipleFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Non-retriable error on attempt {attempt}: {source}")]
    NonRetriable {
        attempt: u32,
        #[source]
        source: Box<GraphError>,
    },

    #[error("Attempts exceeded limit ({attempts}): {source}")]
    AttemptsExceeded {
        attempts: u32,
        #[source]
        source: Box<GraphError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Stage '{stage}' failed for instance '{instance_id}' dimension '{dimension}' (attempt {attempt}): {source}")]
    Stage {
        stage: &'static str,
        instance_id: String,
        dimension: String,
        attempt: u32,
        #[source]
        source: Box<GraphError>,
    },

    #[error("Batch processing failed ({failed} batches), first error: {first}")]
    BatchFailures { failed: usize, first: Box<GraphError> },

    #[error("Unexpected rows affected: expected {expected}, got {actual}")]
    RowsAffectedMismatch { expected: i64, actual: i64 },

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a multiple found error.
    pub fn multiple_found(msg: impl Into<String>) -> Self {
        Self::MultipleFound(msg.into())
    }

    /// The attempt number recorded by the retry layer, if any.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::NonRetriable { attempt, .. } => Some(*attempt),
            Self::AttemptsExceeded { attempts, .. } => Some(*attempts),
            Self::Stage { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }

    /// Peel off retry and stage wrappers to reach the underlying error.
    pub fn root_cause(&self) -> &GraphError {
        match self {
            Self::NonRetriable { source, .. }
            | Self::AttemptsExceeded { source, .. }
            | Self::Stage { source, .. } => source.root_cause(),
            Self::BatchFailures { first, .. } => first.root_cause(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_wrappers() {
        let err = GraphError::Stage {
            stage: "clone_nodes",
            instance_id: "inst".into(),
            dimension: "geography".into(),
            attempt: 3,
            source: Box::new(GraphError::AttemptsExceeded {
                attempts: 3,
                source: Box::new(GraphError::Store(StoreError::new("timeout"))),
            }),
        };

        assert!(matches!(err.root_cause(), GraphError::Store(_)));
        assert_eq!(err.attempts(), Some(3));
        assert!(err.to_string().contains("clone_nodes"));
        assert!(err.to_string().contains("inst"));
    }

    #[test]
    fn test_not_found_through_wrappers() {
        let err = GraphError::NonRetriable {
            attempt: 1,
            source: Box::new(GraphError::not_found("code list")),
        };
        assert!(err.is_not_found());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_messages_are_capitalised() {
        assert_eq!(GraphError::not_found("code list 'age'").to_string(), "Not found: code list 'age'");
        assert_eq!(
            GraphError::Store(StoreError::new("timeout")).to_string(),
            "Store error: timeout"
        );
        assert_eq!(StreamError::NoDataReturned.to_string(), "No data returned in this row");
    }
}

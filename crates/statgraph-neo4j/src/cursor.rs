use async_trait::async_trait;
use neo4rs::DetachedRowStream;
use statgraph_core::StoreError;
use statgraph_graph::{RecordCursor, Row};

use crate::client::{convert_row, store_error};
use crate::cypher::Columns;

/// A live result stream. Dropping the stream returns its connection to the
/// pool, so closing simply drops it.
pub struct Neo4jCursor {
    stream: Option<DetachedRowStream>,
    columns: Columns,
    exhausted: bool,
}

impl Neo4jCursor {
    pub fn new(stream: DetachedRowStream, columns: Columns) -> Self {
        Self {
            stream: Some(stream),
            columns,
            exhausted: false,
        }
    }
}

#[async_trait]
impl RecordCursor for Neo4jCursor {
    async fn next_record(&mut self) -> Result<Option<Row>, StoreError> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(StoreError::new("cursor is closed"));
        };
        match stream.next().await.map_err(store_error)? {
            Some(row) => Ok(Some(convert_row(&row, self.columns))),
            None => {
                self.stream = None;
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.stream = None;
        Ok(())
    }
}

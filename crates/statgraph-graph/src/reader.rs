//! Row-by-row CSV readers.
//!
//! [`StreamRowReader`] turns a live store cursor into CSV lines;
//! [`CompositeRowReader`] chains several readers into one stream.

use async_trait::async_trait;
use statgraph_core::{GraphError, GraphResult, StreamError};

use crate::store::{RecordCursor, Value};

/// A single-pass, forward-only reader of CSV rows.
#[async_trait]
pub trait RowReader: Send {
    /// Next row including its trailing newline, or `None` at end of stream.
    async fn read(&mut self) -> GraphResult<Option<String>>;

    /// Release the underlying resources.
    async fn close(&mut self) -> GraphResult<()>;
}

/// Reads CSV rows from a store cursor. The first column of every record is
/// expected to hold the row text.
pub struct StreamRowReader {
    cursor: Box<dyn RecordCursor>,
}

impl StreamRowReader {
    pub fn new(cursor: Box<dyn RecordCursor>) -> Self {
        Self { cursor }
    }
}

#[async_trait]
impl RowReader for StreamRowReader {
    async fn read(&mut self) -> GraphResult<Option<String>> {
        let Some(record) = self.cursor.next_record().await? else {
            return Ok(None);
        };

        match record.first() {
            None => Err(StreamError::NoDataReturned.into()),
            Some(Value::Str(row)) => Ok(Some(format!("{}\n", row))),
            Some(other) => Err(StreamError::UnrecognisedType(other.type_name().to_string()).into()),
        }
    }

    async fn close(&mut self) -> GraphResult<()> {
        self.cursor.close().await.map_err(GraphError::from)
    }
}

/// Reads each sub-reader to its end before moving to the next.
pub struct CompositeRowReader {
    readers: Vec<Box<dyn RowReader>>,
    current: usize,
}

impl CompositeRowReader {
    pub fn new(readers: Vec<Box<dyn RowReader>>) -> Self {
        Self { readers, current: 0 }
    }
}

#[async_trait]
impl RowReader for CompositeRowReader {
    async fn read(&mut self) -> GraphResult<Option<String>> {
        while let Some(reader) = self.readers.get_mut(self.current) {
            match reader.read().await? {
                Some(row) => return Ok(Some(row)),
                None => self.current += 1,
            }
        }
        Ok(None)
    }

    /// Closes every reader, returning the first failure.
    async fn close(&mut self) -> GraphResult<()> {
        let mut first_err = None;
        for reader in &mut self.readers {
            if let Err(e) = reader.close().await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use statgraph_core::StoreError;

    use crate::store::Row;

    struct FakeCursor {
        records: VecDeque<Row>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RecordCursor for FakeCursor {
        async fn next_record(&mut self) -> Result<Option<Row>, StoreError> {
            Ok(self.records.pop_front())
        }

        async fn close(&mut self) -> Result<(), StoreError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ListReader {
        rows: VecDeque<GraphResult<Option<String>>>,
        close_result: Option<GraphError>,
        closed: Arc<AtomicUsize>,
    }

    impl ListReader {
        fn boxed(rows: &[&str], closed: &Arc<AtomicUsize>) -> Box<dyn RowReader> {
            Box::new(Self {
                rows: rows.iter().map(|r| Ok(Some(format!("{r}\n")))).collect(),
                close_result: None,
                closed: closed.clone(),
            })
        }
    }

    #[async_trait]
    impl RowReader for ListReader {
        async fn read(&mut self) -> GraphResult<Option<String>> {
            self.rows.pop_front().unwrap_or(Ok(None))
        }

        async fn close(&mut self) -> GraphResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            match self.close_result.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn cursor(records: Vec<Row>) -> (Box<dyn RecordCursor>, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let cursor = FakeCursor {
            records: records.into(),
            closed: closed.clone(),
        };
        (Box::new(cursor), closed)
    }

    #[tokio::test]
    async fn test_stream_reader_appends_newline() {
        let (cursor, closed) = cursor(vec![
            Row::new().with("row", "v4_0,time,geography"),
            Row::new().with("row", "146,2014,K02000001"),
        ]);
        let mut reader = StreamRowReader::new(cursor);

        assert_eq!(reader.read().await.unwrap().as_deref(), Some("v4_0,time,geography\n"));
        assert_eq!(reader.read().await.unwrap().as_deref(), Some("146,2014,K02000001\n"));
        assert_eq!(reader.read().await.unwrap(), None);

        reader.close().await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_reader_empty_record_is_no_data() {
        let (cursor, _) = cursor(vec![Row::new()]);
        let mut reader = StreamRowReader::new(cursor);

        let err = reader.read().await.unwrap_err();
        assert!(matches!(err, GraphError::Stream(StreamError::NoDataReturned)));
    }

    #[tokio::test]
    async fn test_stream_reader_rejects_non_text() {
        let (cursor, _) = cursor(vec![Row::new().with("row", 12i64)]);
        let mut reader = StreamRowReader::new(cursor);

        let err = reader.read().await.unwrap_err();
        assert!(matches!(err, GraphError::Stream(StreamError::UnrecognisedType(_))));
    }

    #[tokio::test]
    async fn test_composite_chains_header_then_data() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut reader = CompositeRowReader::new(vec![
            ListReader::boxed(&["header"], &closed),
            ListReader::boxed(&["data"], &closed),
        ]);

        assert_eq!(reader.read().await.unwrap().as_deref(), Some("header\n"));
        assert_eq!(reader.read().await.unwrap().as_deref(), Some("data\n"));
        assert_eq!(reader.read().await.unwrap(), None);
        assert_eq!(reader.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_composite_skips_empty_readers() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut reader = CompositeRowReader::new(vec![
            ListReader::boxed(&[], &closed),
            ListReader::boxed(&[], &closed),
            ListReader::boxed(&["only"], &closed),
        ]);

        assert_eq!(reader.read().await.unwrap().as_deref(), Some("only\n"));
        assert_eq!(reader.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_composite_propagates_errors_without_advancing() {
        let closed = Arc::new(AtomicUsize::new(0));
        let failing = ListReader {
            rows: vec![Err(GraphError::Stream(StreamError::NoDataReturned))].into(),
            close_result: None,
            closed: closed.clone(),
        };
        let mut reader = CompositeRowReader::new(vec![
            Box::new(failing),
            ListReader::boxed(&["data"], &closed),
        ]);

        assert!(reader.read().await.is_err());
        // The failing reader is exhausted now, so the next read advances.
        assert_eq!(reader.read().await.unwrap().as_deref(), Some("data\n"));
    }

    #[tokio::test]
    async fn test_composite_close_closes_all_and_returns_first_error() {
        let closed = Arc::new(AtomicUsize::new(0));
        let first = ListReader {
            rows: VecDeque::new(),
            close_result: Some(GraphError::Internal("first".into())),
            closed: closed.clone(),
        };
        let second = ListReader {
            rows: VecDeque::new(),
            close_result: Some(GraphError::Internal("second".into())),
            closed: closed.clone(),
        };
        let mut reader = CompositeRowReader::new(vec![
            Box::new(first),
            Box::new(second),
            ListReader::boxed(&[], &closed),
        ]);

        let err = reader.close().await.unwrap_err();
        assert_eq!(err.to_string(), "Internal error: first");
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }
}

//! Streaming row fetch.
//!
//! A query's result set is paginated server-side; rows are pulled in the
//! background with `fetch` requests and pushed row-major into a bounded
//! channel, so consumers see backpressure instead of unbounded buffering.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::connection::Connection;
use crate::error::{ExasolError, QueryError};
use crate::query::statement::ExecOpts;
use crate::transport::messages::{
    CloseResultSetRequest, ColumnDef, FetchRequest, FetchedChunk, ResultSetInfo,
};
use crate::transport::Channel;

/// Row buffer between the fetch task and the consumer.
const ROW_CHANNEL_CAPACITY: usize = 1000;

/// Upper bound on the size of a single fetch response.
const FETCH_BYTES: u64 = 64 * 1024 * 1024;

/// Rows streaming out of a query, in source order.
#[derive(Debug)]
pub struct RowStream {
    rows: mpsc::Receiver<Vec<Value>>,
    columns: Vec<ColumnDef>,
    total_rows: u64,
    done: oneshot::Receiver<Result<(), QueryError>>,
}

impl RowStream {
    /// Next row, or `None` when the stream is exhausted.
    pub async fn next(&mut self) -> Option<Vec<Value>> {
        self.rows.recv().await
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Consume the stream and report how the fetch ended.
    ///
    /// A mid-pagination failure is only visible here, after the rows that
    /// arrived before it have been drained.
    pub async fn finish(self) -> Result<(), QueryError> {
        drop(self.rows);
        match self.done.await {
            Ok(result) => result,
            // Producer never started (empty result set)
            Err(_) => Ok(()),
        }
    }
}

impl Connection {
    /// Run a query and stream its rows.
    pub async fn fetch(&self, sql: &str) -> Result<RowStream, ExasolError> {
        self.fetch_opts(sql, None, None).await
    }

    /// Run a query with an optional single row of binds and stream its rows.
    pub async fn fetch_opts(
        &self,
        sql: &str,
        binds: Option<Vec<Value>>,
        schema: Option<&str>,
    ) -> Result<RowStream, ExasolError> {
        self.count("fetch");

        let result = self
            .execute_opts(
                sql,
                ExecOpts {
                    binds: binds.map(|row| vec![row]),
                    schema: schema.map(str::to_string),
                    ..ExecOpts::default()
                },
            )
            .await?;

        if result.results.len() != 1 {
            return Err(QueryError::UnexpectedResponse(format!(
                "expected a single result, got {}",
                result.results.len()
            ))
            .into());
        }
        let info = result.results.into_iter().next().and_then(|r| r.result_set);
        let Some(info) = info else {
            return Err(QueryError::NoResultSet(sql.to_string()).into());
        };

        Ok(start_streaming(self.channel().clone(), info))
    }

    /// Run a query and collect every row into memory.
    pub async fn fetch_all(&self, sql: &str) -> Result<Vec<Vec<Value>>, ExasolError> {
        let mut stream = self.fetch(sql).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row);
        }
        stream.finish().await.map_err(ExasolError::from)?;
        Ok(rows)
    }
}

/// Wire a result set description up to a row channel, paginating if needed.
fn start_streaming(channel: Channel, info: ResultSetInfo) -> RowStream {
    let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel();

    let stream = RowStream {
        rows: rx,
        columns: info.columns.clone(),
        total_rows: info.num_rows,
        done: done_rx,
    };

    // Zero rows: the channel closes by dropping the sender, no fetching.
    if info.num_rows == 0 {
        return stream;
    }

    tokio::spawn(async move {
        let result = pump_rows(&channel, &info, tx).await;
        if let Some(handle) = info.result_set_handle {
            if let Err(e) = channel
                .send::<_, ()>(&CloseResultSetRequest::new(vec![handle]))
                .await
            {
                warn!(handle, error = %e, "failed to close result set");
            }
        }
        let _ = done_tx.send(result);
    });

    stream
}

async fn pump_rows(
    channel: &Channel,
    info: &ResultSetInfo,
    tx: mpsc::Sender<Vec<Value>>,
) -> Result<(), QueryError> {
    let mut delivered: u64 = 0;

    if let Some(inline) = &info.data {
        delivered += send_chunk(&tx, inline.clone()).await?;
    }

    let Some(handle) = info.result_set_handle else {
        return Ok(());
    };

    while delivered < info.num_rows {
        let chunk: FetchedChunk = channel
            .send(&FetchRequest::new(handle, delivered, FETCH_BYTES))
            .await?;
        if chunk.num_rows == 0 {
            // Guard against a server that stops making progress
            return Err(QueryError::UnexpectedResponse(format!(
                "empty fetch at row {} of {}",
                delivered, info.num_rows
            )));
        }
        delivered += send_chunk(&tx, chunk.data).await?;
    }
    Ok(())
}

/// Transpose one column-major chunk and push its rows; `Err` means the
/// consumer went away, which ends pumping without being a failure upstream.
async fn send_chunk(
    tx: &mpsc::Sender<Vec<Value>>,
    columns: Vec<Vec<Value>>,
) -> Result<u64, QueryError> {
    let num_rows = columns.first().map(Vec::len).unwrap_or(0);
    let mut rows: Vec<Vec<Value>> = vec![Vec::with_capacity(columns.len()); num_rows];
    for column in columns {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }
    for row in rows {
        if tx.send(row).await.is_err() {
            return Ok(num_rows as u64);
        }
    }
    Ok(num_rows as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectConfig;
    use crate::transport::channel::tests::scripted_channel;
    use serde_json::json;

    fn test_config() -> ConnectConfig {
        ConnectConfig::builder()
            .host("localhost")
            .username("sys")
            .password("exasol")
            .build()
            .unwrap()
    }

    fn conn_with(responses: Vec<&str>) -> Connection {
        Connection::for_testing_with_channel(test_config(), scripted_channel(responses))
    }

    #[tokio::test]
    async fn test_fetch_inline_rows_in_order() {
        let conn = conn_with(vec![
            r#"{"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "resultSet", "resultSet": {"numRows": 2, "numRowsInMessage": 2, "columns": [{"name": "ID", "dataType": {"type": "DECIMAL"}}, {"name": "NAME", "dataType": {"type": "VARCHAR", "size": 20}}], "data": [[1, 2], ["a", "b"]]}}]}}"#,
        ]);

        let mut stream = conn.fetch("SELECT * FROM t").await.unwrap();
        assert_eq!(stream.total_rows(), 2);
        assert_eq!(stream.columns()[1].name.as_deref(), Some("NAME"));

        assert_eq!(stream.next().await.unwrap(), vec![json!(1), json!("a")]);
        assert_eq!(stream.next().await.unwrap(), vec![json!(2), json!("b")]);
        assert!(stream.next().await.is_none());
        stream.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_zero_rows_closes_immediately() {
        // Only the execute exchange is scripted: any fetch request would
        // overrun the mock.
        let conn = conn_with(vec![
            r#"{"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "resultSet", "resultSet": {"numRows": 0, "numRowsInMessage": 0, "columns": [{"name": "ID", "dataType": {"type": "DECIMAL"}}]}}]}}"#,
        ]);

        let mut stream = conn.fetch("SELECT * FROM empty").await.unwrap();
        assert!(stream.next().await.is_none());
        stream.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_paginates_until_num_rows() {
        let conn = conn_with(vec![
            // 5 total rows: 2 inline, then chunks of 2 and 1
            r#"{"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "resultSet", "resultSet": {"resultSetHandle": 7, "numRows": 5, "numRowsInMessage": 2, "columns": [{"name": "ID", "dataType": {"type": "DECIMAL"}}], "data": [[1, 2]]}}]}}"#,
            r#"{"status": "ok", "responseData": {"numRows": 2, "data": [[3, 4]]}}"#,
            r#"{"status": "ok", "responseData": {"numRows": 1, "data": [[5]]}}"#,
            r#"{"status": "ok"}"#,
        ]);

        let rows = conn.fetch_all("SELECT id FROM t").await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r[0].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces_through_finish() {
        let conn = conn_with(vec![
            r#"{"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "resultSet", "resultSet": {"resultSetHandle": 7, "numRows": 3, "numRowsInMessage": 1, "columns": [{"name": "ID", "dataType": {"type": "DECIMAL"}}], "data": [[1]]}}]}}"#,
            r#"{"status": "error", "exception": {"text": "result set expired"}}"#,
            // Close is still attempted after the failure
            r#"{"status": "ok"}"#,
        ]);

        let mut stream = conn.fetch("SELECT id FROM t").await.unwrap();
        assert_eq!(stream.next().await.unwrap(), vec![json!(1)]);
        assert!(stream.next().await.is_none());

        let err = stream.finish().await.unwrap_err();
        assert!(err.to_string().contains("result set expired"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_row_count_result() {
        let conn = conn_with(vec![
            r#"{"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "rowCount", "rowCount": 3}]}}"#,
        ]);

        let err = conn.fetch("DELETE FROM t").await.unwrap_err();
        assert!(matches!(
            err,
            ExasolError::Query(QueryError::NoResultSet(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_with_binds_goes_through_prepared_path() {
        let conn = conn_with(vec![
            r#"{"status": "ok", "responseData": {"statementHandle": 3, "parameterData": {"numColumns": 1, "columns": [{"dataType": {"type": "DECIMAL"}}]}}}"#,
            r#"{"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "resultSet", "resultSet": {"numRows": 1, "numRowsInMessage": 1, "columns": [{"name": "ID", "dataType": {"type": "DECIMAL"}}], "data": [[42]]}}]}}"#,
        ]);

        let mut stream = conn
            .fetch_opts("SELECT id FROM t WHERE id = ?", Some(vec![json!(42)]), None)
            .await
            .unwrap();
        assert_eq!(stream.next().await.unwrap(), vec![json!(42)]);
    }
}

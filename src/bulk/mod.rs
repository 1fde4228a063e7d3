//! Bulk CSV IMPORT/EXPORT through a local side channel.
//!
//! An IMPORT or EXPORT statement names a URL; the server connects back to it
//! and moves the CSV bytes over that connection while the SQL command itself
//! stays pending on the WebSocket. The orchestrator here runs both halves
//! concurrently and joins their outcomes under one timeout.
//!
//! Four operations, each in a buffer and a stream variant:
//! insert/select target a single table with generated SQL; execute/query take
//! caller SQL containing a `%s` placeholder for the endpoint URL.

pub mod endpoint;
pub mod pool;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{BulkError, ExasolError, TransportError};
use crate::transport::messages::{ExecuteRequest, StatementResult};
use crate::transport::Channel;

pub use endpoint::{BulkEndpoint, TcpEndpoint};
pub use pool::BufferPool;

/// Import attempts: the first try plus one retry on a pre-transfer refusal.
const IMPORT_ATTEMPTS: u32 = 2;

/// Export attempts. The asymmetry with imports is deliberate; exports see
/// spurious refusals more often and retrying them is always safe.
const EXPORT_ATTEMPTS: u32 = 3;

/// Chunks buffered between the endpoint and an export consumer.
const EXPORT_CHANNEL_CAPACITY: usize = 1;

impl Connection {
    /// Load a CSV buffer into `schema.table`.
    pub async fn bulk_insert(
        &self,
        schema: &str,
        table: &str,
        data: &[u8],
    ) -> Result<(), ExasolError> {
        self.count("bulk_insert");
        let sql = self.table_import_sql(schema, table);
        self.bulk_execute(&sql, data).await
    }

    /// Run a caller-supplied IMPORT statement against a CSV buffer.
    ///
    /// `sql` must contain a `%s` placeholder for the endpoint URL.
    pub async fn bulk_execute(&self, sql: &str, data: &[u8]) -> Result<(), ExasolError> {
        self.count("bulk_execute");
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(data.to_vec()).await;
        drop(tx);
        self.stream_execute(sql, rx).await
    }

    /// Load a channel of CSV chunks into `schema.table`.
    pub async fn stream_insert(
        &self,
        schema: &str,
        table: &str,
        data: mpsc::Receiver<Vec<u8>>,
    ) -> Result<(), ExasolError> {
        self.count("stream_insert");
        let sql = self.table_import_sql(schema, table);
        self.stream_execute(&sql, data).await
    }

    /// Run a caller-supplied IMPORT statement against a channel of chunks.
    ///
    /// Chunks of roughly 64 KiB keep the transfer efficient. There is no
    /// cancellation once started; the operation runs to completion, error,
    /// or timeout.
    pub async fn stream_execute(
        &self,
        sql: &str,
        data: mpsc::Receiver<Vec<u8>>,
    ) -> Result<(), ExasolError> {
        self.count("stream_execute");
        ensure_placeholder(sql)?;

        let host = self.config().host.clone();
        let port = self.config().port;
        let pool = Arc::clone(&self.pool);
        run_import(self.channel(), sql, data, self.config().timeout, || {
            TcpEndpoint::bind(&host, port, Arc::clone(&pool))
        })
        .await
        .map(|_| ())
        .map_err(ExasolError::from)
    }

    /// Export `schema.table` as one CSV buffer.
    pub async fn bulk_select(&self, schema: &str, table: &str) -> Result<Vec<u8>, ExasolError> {
        self.count("bulk_select");
        let sql = self.table_export_sql(schema, table);
        self.bulk_query(&sql).await
    }

    /// Run a caller-supplied EXPORT statement, collecting the CSV in memory.
    pub async fn bulk_query(&self, sql: &str) -> Result<Vec<u8>, ExasolError> {
        self.count("bulk_query");
        let mut stream = self.stream_query(sql).await?;
        let mut out = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            out.extend_from_slice(&chunk);
            stream.return_chunk(chunk);
        }
        stream.finish().await?;
        Ok(out)
    }

    /// Export `schema.table` as a stream of CSV chunks.
    pub async fn stream_select(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<ExportStream, ExasolError> {
        self.count("stream_select");
        let sql = self.table_export_sql(schema, table);
        self.stream_query(&sql).await
    }

    /// Run a caller-supplied EXPORT statement, streaming the CSV out.
    ///
    /// Returns immediately with a live stream; the transfer (and its retry
    /// loop) runs in the background. A failure becomes visible through
    /// [`ExportStream::finish`] once the chunks that arrived before it have
    /// been drained.
    pub async fn stream_query(&self, sql: &str) -> Result<ExportStream, ExasolError> {
        self.count("stream_query");
        ensure_placeholder(sql)?;

        let (data_tx, data_rx) = mpsc::channel(EXPORT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();

        let channel = self.channel().clone();
        let sql = sql.to_string();
        let host = self.config().host.clone();
        let port = self.config().port;
        let pool = Arc::clone(&self.pool);
        let timeout = self.config().timeout;

        tokio::spawn(async move {
            let result = run_export(&channel, &sql, data_tx, stop_rx, timeout, || {
                TcpEndpoint::bind(&host, port, Arc::clone(&pool))
            })
            .await;
            let _ = done_tx.send(result);
        });

        Ok(ExportStream {
            data: data_rx,
            pool: Arc::clone(&self.pool),
            stop: stop_tx,
            done: done_rx,
        })
    }

    fn table_import_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "IMPORT INTO {}.{} FROM CSV AT '%s' FILE 'data.csv'",
            self.quote_ident(schema),
            self.quote_ident(table)
        )
    }

    fn table_export_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "EXPORT {}.{} INTO CSV AT '%s' FILE 'data.csv'",
            self.quote_ident(schema),
            self.quote_ident(table)
        )
    }
}

/// CSV chunks flowing out of an EXPORT.
pub struct ExportStream {
    data: mpsc::Receiver<Vec<u8>>,
    pool: Arc<BufferPool>,
    stop: mpsc::Sender<()>,
    done: oneshot::Receiver<Result<u64, BulkError>>,
}

impl ExportStream {
    /// Next CSV chunk, or `None` when the transfer is over.
    ///
    /// Return consumed chunks with [`ExportStream::return_chunk`] to keep the
    /// transfer allocation-free.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.data.recv().await
    }

    /// Give a consumed chunk's buffer back to the pool.
    pub fn return_chunk(&self, buf: Vec<u8>) {
        self.pool.put(buf);
    }

    /// Drain whatever is left and report how the export ended.
    ///
    /// The terminal error is only determined once the data channel is
    /// exhausted, so this drains before looking at it.
    pub async fn finish(mut self) -> Result<u64, BulkError> {
        while let Some(chunk) = self.data.recv().await {
            self.pool.put(chunk);
        }
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(BulkError::TaskFailed("export task dropped".to_string())),
        }
    }

    /// Stop the export early.
    ///
    /// Forces the endpoint shut; the error that shutdown provokes is the
    /// caller's own doing and is swallowed rather than surfaced.
    pub async fn cancel(mut self) {
        let _ = self.stop.try_send(());
        while let Some(chunk) = self.data.recv().await {
            self.pool.put(chunk);
        }
        let _ = self.done.await;
    }
}

fn ensure_placeholder(sql: &str) -> Result<(), BulkError> {
    if sql.contains("%s") {
        Ok(())
    } else {
        Err(BulkError::MissingPlaceholder)
    }
}

fn substitute_url(sql: &str, url: &str) -> String {
    sql.replacen("%s", url, 1)
}

/// Import retry loop: re-attempt on a zero-byte connection refusal, up to
/// [`IMPORT_ATTEMPTS`] tries total.
async fn run_import<E, F, Fut>(
    channel: &Channel,
    sql: &str,
    mut data: mpsc::Receiver<Vec<u8>>,
    timeout_secs: u32,
    make_endpoint: F,
) -> Result<u64, BulkError>
where
    E: BulkEndpoint,
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<E, BulkError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let endpoint = make_endpoint().await?;
        let (result, recovered) = import_attempt(channel, sql, endpoint, data, timeout_secs).await;
        match result {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.is_retryable_refusal() && attempt < IMPORT_ATTEMPTS => {
                match recovered {
                    Some(d) => {
                        warn!(attempt, "import refused before any data moved, retrying");
                        data = d;
                    }
                    None => return Err(err),
                }
            }
            Err(err) => return Err(mark_partial_loss(err)),
        }
    }
}

/// Export retry loop, mirroring [`run_import`] with its own attempt budget.
async fn run_export<E, F, Fut>(
    channel: &Channel,
    sql: &str,
    out: mpsc::Sender<Vec<u8>>,
    mut stop: mpsc::Receiver<()>,
    timeout_secs: u32,
    make_endpoint: F,
) -> Result<u64, BulkError>
where
    E: BulkEndpoint,
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<E, BulkError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let endpoint = make_endpoint().await?;
        let (result, recovered) =
            export_attempt(channel, sql, endpoint, out.clone(), stop, timeout_secs).await;
        match result {
            Err(err) if err.is_retryable_refusal() && attempt < EXPORT_ATTEMPTS => match recovered {
                Some(s) => {
                    warn!(attempt, "export refused before any data moved, retrying");
                    stop = s;
                }
                None => return Err(err),
            },
            other => return other,
        }
    }
}

/// Consume the response of an abandoned request in the background.
///
/// The reply future owns the transport guard, so the lock stays held until
/// the stale frame is read; the next request on the channel cannot mistake
/// that frame for its own response.
fn discard_reply<F>(reply: F)
where
    F: std::future::Future<Output = Result<StatementResult, TransportError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = reply.await {
            debug!(error = %e, "late response for abandoned bulk request");
        }
    });
}

/// A refusal after bytes moved cannot be retried; the data is gone.
fn mark_partial_loss(err: BulkError) -> BulkError {
    match err {
        BulkError::Transfer { bytes, source }
            if bytes > 0 && source.kind() == std::io::ErrorKind::ConnectionRefused =>
        {
            BulkError::DataAlreadySent { bytes }
        }
        other => other,
    }
}

/// One import try: issue the SQL, drive the endpoint writer, race both
/// against the timeout. The data receiver comes back out when the transfer
/// task finished, so a retry can resume from the same channel.
async fn import_attempt<E: BulkEndpoint>(
    channel: &Channel,
    sql: &str,
    mut endpoint: E,
    mut data: mpsc::Receiver<Vec<u8>>,
    timeout_secs: u32,
) -> (Result<u64, BulkError>, Option<mpsc::Receiver<Vec<u8>>>) {
    let sql = substitute_url(sql, &endpoint.url());
    debug!(sql = %sql, "bulk import");

    let pending = match channel.begin_send(&ExecuteRequest::new(sql)).await {
        Ok(pending) => pending,
        Err(e) => return (Err(BulkError::Command(e)), Some(data)),
    };
    let mut reply = Box::pin(pending.wait::<StatementResult>());

    let written = Arc::new(AtomicU64::new(0));
    let mut transfer = {
        let written = Arc::clone(&written);
        tokio::spawn(async move {
            let result = endpoint.write_stream(&mut data, &written).await;
            (result, data)
        })
    };

    let deadline = transfer_deadline(timeout_secs);
    tokio::pin!(deadline);

    tokio::select! {
        joined = &mut transfer => match joined {
            Err(e) => {
                discard_reply(reply);
                (Err(BulkError::TaskFailed(e.to_string())), None)
            }
            Ok((Err(e), data)) => {
                discard_reply(reply);
                (Err(e), Some(data))
            }
            Ok((Ok(bytes), data)) => match reply.await {
                Ok(_) => (Ok(bytes), Some(data)),
                Err(e) => (Err(BulkError::Command(e)), Some(data)),
            },
        },
        replied = &mut reply => match replied {
            Err(e) => {
                transfer.abort();
                (Err(BulkError::Command(e)), None)
            }
            Ok(_) => match transfer.await {
                Err(e) => (Err(BulkError::TaskFailed(e.to_string())), None),
                Ok((Err(e), data)) => (Err(e), Some(data)),
                Ok((Ok(bytes), data)) => (Ok(bytes), Some(data)),
            },
        },
        _ = &mut deadline => {
            transfer.abort();
            discard_reply(reply);
            warn!(
                bytes = written.load(Ordering::Relaxed),
                "import timed out mid-transfer"
            );
            (Err(BulkError::Timeout), None)
        }
    }
}

/// One export try. A stop-induced [`BulkError::Stopped`] from the endpoint is
/// the caller's own cancellation and resolves as success with the bytes read
/// so far.
async fn export_attempt<E: BulkEndpoint>(
    channel: &Channel,
    sql: &str,
    mut endpoint: E,
    out: mpsc::Sender<Vec<u8>>,
    mut stop: mpsc::Receiver<()>,
    timeout_secs: u32,
) -> (Result<u64, BulkError>, Option<mpsc::Receiver<()>>) {
    let sql = substitute_url(sql, &endpoint.url());
    debug!(sql = %sql, "bulk export");

    let pending = match channel.begin_send(&ExecuteRequest::new(sql)).await {
        Ok(pending) => pending,
        Err(e) => return (Err(BulkError::Command(e)), Some(stop)),
    };
    let mut reply = Box::pin(pending.wait::<StatementResult>());

    let read = Arc::new(AtomicU64::new(0));
    let mut transfer = {
        let read = Arc::clone(&read);
        tokio::spawn(async move {
            let result = endpoint.read_stream(&out, &mut stop, &read).await;
            (result, stop)
        })
    };

    let deadline = transfer_deadline(timeout_secs);
    tokio::pin!(deadline);

    tokio::select! {
        joined = &mut transfer => match joined {
            Err(e) => {
                discard_reply(reply);
                (Err(BulkError::TaskFailed(e.to_string())), None)
            }
            Ok((Err(BulkError::Stopped), stop)) => {
                discard_reply(reply);
                (Ok(read.load(Ordering::Relaxed)), Some(stop))
            }
            Ok((Err(e), stop)) => {
                discard_reply(reply);
                (Err(e), Some(stop))
            }
            Ok((Ok(bytes), stop)) => match reply.await {
                Ok(_) => (Ok(bytes), Some(stop)),
                Err(e) => (Err(BulkError::Command(e)), Some(stop)),
            },
        },
        replied = &mut reply => match replied {
            Err(e) => {
                transfer.abort();
                (Err(BulkError::Command(e)), None)
            }
            Ok(_) => match transfer.await {
                Err(e) => (Err(BulkError::TaskFailed(e.to_string())), None),
                Ok((Err(BulkError::Stopped), stop)) => {
                    (Ok(read.load(Ordering::Relaxed)), Some(stop))
                }
                Ok((Err(e), stop)) => (Err(e), Some(stop)),
                Ok((Ok(bytes), stop)) => (Ok(bytes), Some(stop)),
            },
        },
        _ = &mut deadline => {
            transfer.abort();
            discard_reply(reply);
            warn!(
                bytes = read.load(Ordering::Relaxed),
                "export timed out mid-transfer"
            );
            (Err(BulkError::Timeout), None)
        }
    }
}

/// Timer arm of the race; a timeout of 0 never fires.
async fn transfer_deadline(timeout_secs: u32) {
    match timeout_secs {
        0 => std::future::pending().await,
        secs => tokio::time::sleep(std::time::Duration::from_secs(secs.into())).await,
    }
}

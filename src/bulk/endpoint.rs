//! Local endpoint for bulk transfers.
//!
//! An IMPORT or EXPORT statement makes the server dial back into the client
//! for the actual byte transfer. [`BulkEndpoint`] is the orchestrator's
//! contract for that listener; [`TcpEndpoint`] is the real thing, an
//! ephemeral TCP listener accepting exactly one inbound connection.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tracing::debug;

use crate::bulk::pool::BufferPool;
use crate::error::BulkError;

/// The server-facing side of a bulk transfer.
///
/// Exactly one inbound connection is accepted per endpoint. Forced shutdown
/// is by dropping the endpoint (or aborting the task driving it), which
/// closes the listener and any accepted connection.
#[async_trait]
pub trait BulkEndpoint: Send + 'static {
    /// Address to substitute into the IMPORT/EXPORT SQL.
    fn url(&self) -> String;

    /// Write caller chunks to the server's inbound connection until the
    /// channel closes. `written` tracks progress for retry classification.
    async fn write_stream(
        &mut self,
        data: &mut mpsc::Receiver<Vec<u8>>,
        written: &AtomicU64,
    ) -> Result<u64, BulkError>;

    /// Read the server's inbound byte stream into `out` until EOF.
    ///
    /// A stop signal forces shutdown and returns [`BulkError::Stopped`] so
    /// the orchestrator can tell cancellation from failure.
    async fn read_stream(
        &mut self,
        out: &mpsc::Sender<Vec<u8>>,
        stop: &mut mpsc::Receiver<()>,
        read: &AtomicU64,
    ) -> Result<u64, BulkError>;
}

/// Ephemeral TCP listener on a port chosen by the OS.
pub struct TcpEndpoint {
    listener: TcpListener,
    advertised_ip: IpAddr,
    port: u16,
    pool: Arc<BufferPool>,
}

impl TcpEndpoint {
    /// Bind a fresh listener, advertising the local address the server can
    /// reach us on (discovered by routing a UDP socket toward the server).
    pub async fn bind(
        server_host: &str,
        server_port: u16,
        pool: Arc<BufferPool>,
    ) -> Result<Self, BulkError> {
        let listener = TcpListener::bind(("0.0.0.0", 0)).await.map_err(io_err)?;
        let port = listener.local_addr().map_err(io_err)?.port();

        let probe = UdpSocket::bind(("0.0.0.0", 0)).await.map_err(io_err)?;
        probe
            .connect((server_host, server_port))
            .await
            .map_err(io_err)?;
        let advertised_ip = probe.local_addr().map_err(io_err)?.ip();

        debug!(ip = %advertised_ip, port, "bulk endpoint listening");
        Ok(Self {
            listener,
            advertised_ip,
            port,
            pool,
        })
    }
}

fn io_err(source: std::io::Error) -> BulkError {
    BulkError::Transfer { bytes: 0, source }
}

#[async_trait]
impl BulkEndpoint for TcpEndpoint {
    fn url(&self) -> String {
        format!("http://{}:{}", self.advertised_ip, self.port)
    }

    async fn write_stream(
        &mut self,
        data: &mut mpsc::Receiver<Vec<u8>>,
        written: &AtomicU64,
    ) -> Result<u64, BulkError> {
        let (mut stream, peer) = self.listener.accept().await.map_err(io_err)?;
        debug!(%peer, "server connected for import");

        let mut total: u64 = 0;
        while let Some(chunk) = data.recv().await {
            stream
                .write_all(&chunk)
                .await
                .map_err(|source| BulkError::Transfer { bytes: total, source })?;
            total += chunk.len() as u64;
            written.store(total, Ordering::Relaxed);
            self.pool.put(chunk);
        }

        stream
            .shutdown()
            .await
            .map_err(|source| BulkError::Transfer { bytes: total, source })?;
        Ok(total)
    }

    async fn read_stream(
        &mut self,
        out: &mpsc::Sender<Vec<u8>>,
        stop: &mut mpsc::Receiver<()>,
        read: &AtomicU64,
    ) -> Result<u64, BulkError> {
        let mut stream = tokio::select! {
            accepted = self.listener.accept() => {
                let (stream, peer) = accepted.map_err(io_err)?;
                debug!(%peer, "server connected for export");
                stream
            }
            _ = stop.recv() => return Err(BulkError::Stopped),
        };

        let mut total: u64 = 0;
        loop {
            let mut buf = self.pool.get();
            let n = tokio::select! {
                n = stream.read(&mut buf) => {
                    n.map_err(|source| BulkError::Transfer { bytes: total, source })?
                }
                _ = stop.recv() => {
                    self.pool.put(buf);
                    return Err(BulkError::Stopped);
                }
            };
            if n == 0 {
                self.pool.put(buf);
                return Ok(total);
            }
            buf.truncate(n);
            total += n as u64;
            read.store(total, Ordering::Relaxed);
            if out.send(buf).await.is_err() {
                // Consumer went away; stop reading but report what moved
                return Ok(total);
            }
        }
    }
}

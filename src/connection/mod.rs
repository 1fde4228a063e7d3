//! Connection lifecycle and session state.

pub mod auth;
pub mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::bulk::pool::BufferPool;
use crate::error::{ConnectionError, ExasolError};
use crate::query::prepared::PreparedStatement;
use crate::transport::messages::{Attributes, DisconnectRequest, SetAttributesRequest};
use crate::transport::{Channel, WebSocketTransport};

pub use config::{ConnectConfig, ConnectConfigBuilder};

/// An authenticated Exasol session.
///
/// All methods take `&self`; the underlying socket is serialized internally,
/// and operations that need more than one request (the prepared-statement
/// path behind bind execution) take the session lock on their own.
/// [`Connection::lock`] is for caller-composed sequences of single calls;
/// the lock is not reentrant, so do not hold it across a call that carries
/// binds.
pub struct Connection {
    config: ConnectConfig,
    channel: Channel,
    session_id: u64,
    /// Per-operation invocation counters
    stats: StdMutex<HashMap<String, u64>>,
    pub(crate) stmt_cache: Mutex<HashMap<String, PreparedStatement>>,
    session_lock: Mutex<()>,
    pub(crate) pool: Arc<BufferPool>,
}

impl Connection {
    /// Connect and authenticate.
    pub async fn connect(config: ConnectConfig) -> Result<Self, ExasolError> {
        config.validate()?;

        let transport = WebSocketTransport::connect(&config.host, config.port)
            .await
            .map_err(|e| ConnectionError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                message: e.to_string(),
            })?;
        let channel = Channel::new(
            Arc::new(Mutex::new(transport)),
            config.suppress_errors,
        );

        let session_id = auth::login(&channel, &config).await?;
        info!(host = %config.host, port = config.port, session_id, "connected");

        let conn = Self::assemble(config, channel, session_id);
        if conn.config.timeout > 0 {
            conn.set_timeout(conn.config.timeout).await?;
        }
        Ok(conn)
    }

    fn assemble(config: ConnectConfig, channel: Channel, session_id: u64) -> Self {
        Self {
            config,
            channel,
            session_id,
            stats: StdMutex::new(HashMap::new()),
            stmt_cache: Mutex::new(HashMap::new()),
            session_lock: Mutex::new(()),
            pool: Arc::new(BufferPool::new()),
        }
    }

    /// Close cached statements, say goodbye, and drop the socket.
    pub async fn disconnect(&self) -> Result<(), ExasolError> {
        self.count("disconnect");
        self.close_cached_statements().await;

        if let Err(e) = self.channel.send::<_, ()>(&DisconnectRequest::new()).await {
            warn!(error = %e, "disconnect command failed");
        }
        self.channel.close().await.map_err(ExasolError::from)
    }

    pub(crate) async fn close_cached_statements(&self) {
        let statements: Vec<PreparedStatement> =
            self.stmt_cache.lock().await.drain().map(|(_, v)| v).collect();
        for stmt in statements {
            if let Err(e) = stmt.close(&self.channel).await {
                warn!(handle = stmt.handle, error = %e, "failed to close prepared statement");
            }
        }
    }

    /// Update session attributes on the server.
    pub async fn set_attributes(&self, attributes: Attributes) -> Result<(), ExasolError> {
        self.count("set_attributes");
        self.channel
            .send::<_, ()>(&SetAttributesRequest::new(attributes))
            .await
            .map_err(ExasolError::from)
    }

    /// Hold the session for a caller-composed sequence of calls.
    ///
    /// Individual requests are already serialized; take this lock when a
    /// sequence of requests must run without another task's requests in
    /// between. Executes with binds take this same non-reentrant lock
    /// internally, so do not hold it across them.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.session_lock.lock().await
    }

    /// The numeric id of this session, as reported by `CURRENT_SESSION`.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Snapshot of per-operation invocation counts.
    pub fn stats(&self) -> HashMap<String, u64> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn count(&self, op: &str) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        *stats.entry(op.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }

    pub(crate) fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// Test seam: build a connection around a pre-scripted channel.
    #[cfg(test)]
    pub(crate) fn for_testing_with_channel(config: ConnectConfig, channel: Channel) -> Self {
        Self::assemble(config, channel, 1)
    }
}

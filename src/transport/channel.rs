//! Request/reply channel over a frame transport.
//!
//! Every Exasol command is a single JSON request followed by a single JSON
//! response envelope. [`Channel::send`] does both in one call. For bulk
//! IMPORT/EXPORT, where data must flow through a side channel between the
//! request and its response, [`Channel::begin_send`] writes the request and
//! hands back a [`PendingReply`] to resolve later.
//!
//! The transport sits behind a mutex; a `PendingReply` holds the guard, so no
//! second request can interleave while a reply is outstanding.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, trace};

use crate::error::TransportError;

use super::messages::ResponseEnvelope;

/// One text frame in, one text frame out.
///
/// Implemented by [`super::websocket::WebSocketTransport`]; mocked in tests.
#[async_trait]
pub trait FrameTransport: Send {
    async fn send_frame(&mut self, text: String) -> Result<(), TransportError>;
    async fn recv_frame(&mut self) -> Result<String, TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Serializing request/reply channel over a shared frame transport.
#[derive(Clone)]
pub struct Channel {
    transport: Arc<Mutex<dyn FrameTransport>>,
    /// Log server errors at debug instead of error level
    suppress_errors: bool,
}

impl Channel {
    pub fn new(transport: Arc<Mutex<dyn FrameTransport>>, suppress_errors: bool) -> Self {
        Self {
            transport,
            suppress_errors,
        }
    }

    /// Send a request and wait for its typed response payload.
    pub async fn send<T, R>(&self, request: &T) -> Result<R, TransportError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.begin_send(request).await?.wait().await
    }

    /// Write a request frame now; resolve the response later.
    ///
    /// The returned [`PendingReply`] keeps the transport locked until it is
    /// waited on or dropped, so the reply cannot be claimed by another caller.
    pub async fn begin_send<T>(&self, request: &T) -> Result<PendingReply, TransportError>
    where
        T: Serialize + ?Sized,
    {
        let text = serde_json::to_string(request)?;
        trace!(request = %text, "sending request");

        let mut guard = Arc::clone(&self.transport).lock_owned().await;
        guard.send_frame(text).await?;

        Ok(PendingReply {
            guard,
            suppress_errors: self.suppress_errors,
        })
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.transport.lock().await.close().await
    }
}

/// A request that has been written but whose response has not been read yet.
pub struct PendingReply {
    guard: OwnedMutexGuard<dyn FrameTransport>,
    suppress_errors: bool,
}

impl PendingReply {
    /// Read exactly one response frame and decode its payload.
    ///
    /// A non-`ok` status becomes [`TransportError::Server`]. Otherwise the
    /// payload is taken from `responseData`, falling back to `attributes`,
    /// falling back to `null` for acknowledgement-only commands.
    pub async fn wait<R>(mut self) -> Result<R, TransportError>
    where
        R: DeserializeOwned,
    {
        let text = self.guard.recv_frame().await?;
        trace!(response = %text, "received response");
        drop(self.guard);

        let envelope: ResponseEnvelope = serde_json::from_str(&text)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        if envelope.status != "ok" {
            let (text, sql_code) = match envelope.exception {
                Some(exc) => (exc.text, exc.sql_code),
                None => (format!("status '{}'", envelope.status), None),
            };
            if self.suppress_errors {
                debug!(text = %text, sql_code = ?sql_code, "server error (suppressed)");
            } else {
                error!(text = %text, sql_code = ?sql_code, "server error");
            }
            return Err(TransportError::Server { text, sql_code });
        }

        let payload = envelope
            .response_data
            .or(envelope.attributes)
            .unwrap_or(Value::Null);

        serde_json::from_value(payload).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

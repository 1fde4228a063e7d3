//! Error types for exastream.
//!
//! This module defines domain-specific error types organized by functional area.

use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug)]
pub enum ExasolError {
    /// Connection-related errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Query execution errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Bulk IMPORT/EXPORT errors
    #[error(transparent)]
    Bulk(#[from] BulkError),

    /// Transport protocol errors
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors related to database connections.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish connection to the database
    #[error("Failed to connect to {host}:{port}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
    },

    /// Authentication failure
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid connection parameters
    #[error("Invalid connection parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Connection is closed
    #[error("Connection is closed")]
    ConnectionClosed,
}

/// Errors related to query execution.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Underlying request failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Parameter bind rows are not uniformly shaped
    #[error("Bind row {row} has {found} values, expected {expected}")]
    JaggedBinds {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// The server returned a response shape the request kind does not allow
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A result set was expected but the response carried none
    #[error("Missing result set: {0}")]
    NoResultSet(String),
}

/// Errors related to bulk IMPORT/EXPORT transfers.
#[derive(Error, Debug)]
pub enum BulkError {
    /// The SQL command side of the transfer failed
    #[error("Bulk SQL command failed: {0}")]
    Command(#[from] TransportError),

    /// The byte transfer through the local endpoint failed
    #[error("Transfer failed after {bytes} bytes: {source}")]
    Transfer {
        bytes: u64,
        #[source]
        source: std::io::Error,
    },

    /// A transfer failed after data was already delivered; it cannot be resent
    #[error("Transfer failed after {bytes} bytes were already sent; not retried")]
    DataAlreadySent { bytes: u64 },

    /// The combined command+transfer race exceeded the configured timeout
    #[error("Bulk operation timed out")]
    Timeout,

    /// The transfer was stopped through the early-cancellation signal
    #[error("Transfer stopped by caller")]
    Stopped,

    /// The supplied SQL has no `%s` placeholder for the endpoint URL
    #[error("Bulk SQL must contain a '%s' placeholder for the endpoint URL")]
    MissingPlaceholder,

    /// A background transfer task failed to run to completion
    #[error("Transfer task failed: {0}")]
    TaskFailed(String),
}

/// Errors related to transport protocol.
#[derive(Error, Debug)]
pub enum TransportError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Message serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Message send error
    #[error("Failed to send message: {0}")]
    SendError(String),

    /// Message receive error
    #[error("Failed to receive message: {0}")]
    ReceiveError(String),

    /// Response was well-formed JSON but not a valid protocol message
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// The server answered with a non-success status
    #[error("Server error: {text}{}", .sql_code.as_deref().map(|c| format!(" (SQL code: {c})")).unwrap_or_default())]
    Server {
        text: String,
        sql_code: Option<String>,
    },
}

impl TransportError {
    /// Whether this is the server's "prepared statement handle was evicted"
    /// signature, which permits one transparent re-prepare.
    pub fn is_statement_handle_missing(&self) -> bool {
        matches!(self, TransportError::Server { text, .. } if text.contains("Statement handle not found"))
    }
}

impl BulkError {
    /// The narrow pre-transfer signature that permits a retry: the server's
    /// connection back to the endpoint was refused before any byte moved.
    pub fn is_retryable_refusal(&self) -> bool {
        matches!(
            self,
            BulkError::Transfer { bytes: 0, source }
                if source.kind() == std::io::ErrorKind::ConnectionRefused
        )
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocketError(err.to_string())
    }
}

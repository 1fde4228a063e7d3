//! Wire transport for the Exasol WebSocket protocol.
//!
//! Three layers: [`messages`] defines the typed JSON requests and payloads,
//! [`websocket`] frames them over `tokio-tungstenite`, and [`channel`] runs
//! the one-request-one-response discipline on top, including the split
//! write-now-read-later path that bulk transfers need.

pub mod channel;
pub mod messages;
pub mod websocket;

pub use channel::{Channel, FrameTransport, PendingReply};
pub use websocket::WebSocketTransport;

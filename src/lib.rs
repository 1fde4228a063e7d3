//! Exasol WebSocket protocol client with bulk CSV IMPORT/EXPORT streaming.
//!
//! `exastream` speaks Exasol's WebSocket API directly: RSA-encrypted login,
//! direct and prepared statement execution, paginated result streaming with
//! backpressure, and high-throughput bulk loads and exports through the
//! server's CSV side channel.
//!
//! # Connecting
//!
//! ```no_run
//! use exastream::{ConnectConfig, Connection};
//!
//! # async fn example() -> Result<(), exastream::ExasolError> {
//! let config = ConnectConfig::builder()
//!     .host("exasol.example.com")
//!     .port(8563)
//!     .username("sys")
//!     .password("exasol")
//!     .build()?;
//! let conn = Connection::connect(config).await?;
//!
//! conn.execute("CREATE SCHEMA IF NOT EXISTS test").await?;
//!
//! let mut rows = conn.fetch("SELECT * FROM test.t").await?;
//! while let Some(row) = rows.next().await {
//!     println!("{:?}", row);
//! }
//! rows.finish().await?;
//!
//! conn.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Bulk transfers
//!
//! The fastest way in or out is the CSV side channel: the client opens an
//! ephemeral local listener, hands its address to an IMPORT/EXPORT statement,
//! and the server connects back for the raw bytes.
//!
//! ```no_run
//! # async fn example(conn: exastream::Connection) -> Result<(), exastream::ExasolError> {
//! conn.bulk_insert("TEST", "T", b"1,alice\n2,bob\n").await?;
//! let csv = conn.bulk_select("TEST", "T").await?;
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod connection;
pub mod error;
pub mod query;
pub mod transport;

pub use bulk::{BufferPool, ExportStream};
pub use connection::{ConnectConfig, ConnectConfigBuilder, Connection};
pub use error::{BulkError, ConnectionError, ExasolError, QueryError, TransportError};
pub use query::{ExecOpts, RowStream};
pub use transport::messages::{Attributes, ColumnDef, ColumnType, StatementResult};

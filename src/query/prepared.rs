//! Server-side prepared statement handles.

use tracing::debug;

use crate::error::TransportError;
use crate::transport::messages::{
    ClosePreparedRequest, ColumnDef, CreatePreparedRequest, PreparedInfo,
};
use crate::transport::Channel;

/// A prepared statement held open on the server.
///
/// Cached per connection keyed by SQL text; the handle can be evicted by the
/// server at any time, which the statement engine recovers from by preparing
/// again.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub handle: i64,
    /// Parameter column descriptors reported by the server
    pub columns: Vec<ColumnDef>,
}

impl PreparedStatement {
    pub(crate) async fn prepare(
        channel: &Channel,
        sql: &str,
        schema: Option<&str>,
    ) -> Result<Self, TransportError> {
        let info: PreparedInfo = channel
            .send(&CreatePreparedRequest::new(sql, schema))
            .await?;
        debug!(handle = info.statement_handle, "prepared statement");

        Ok(Self {
            handle: info.statement_handle,
            columns: info
                .parameter_data
                .map(|p| p.columns)
                .unwrap_or_default(),
        })
    }

    pub(crate) async fn close(&self, channel: &Channel) -> Result<(), TransportError> {
        channel
            .send::<_, ()>(&ClosePreparedRequest::new(self.handle))
            .await
    }
}

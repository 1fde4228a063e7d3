//! Statement execution with parameter binds.
//!
//! Plain SQL goes out as a single `execute` request. Binds route through a
//! server-side prepared statement, cached per connection and keyed by SQL
//! text; bind rows are transposed to the column-major layout the wire wants.

use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{ExasolError, QueryError};
use crate::query::prepared::PreparedStatement;
use crate::transport::messages::{
    Attributes, ColumnType, ExecutePreparedRequest, ExecuteRequest, GetAttributesRequest,
    StatementResult,
};

/// Options for [`Connection::execute_opts`].
#[derive(Debug, Clone, Default)]
pub struct ExecOpts {
    /// Row-major parameter rows (column-major when `columnar` is set)
    pub binds: Option<Vec<Vec<Value>>>,
    /// Schema to resolve unqualified names against
    pub schema: Option<String>,
    /// Override the parameter column types reported by the server
    pub column_types: Option<Vec<ColumnType>>,
    /// Binds are already column-major; skip the transpose
    pub columnar: bool,
}

impl Connection {
    /// Execute a SQL statement without binds.
    pub async fn execute(&self, sql: &str) -> Result<StatementResult, ExasolError> {
        self.execute_opts(sql, ExecOpts::default()).await
    }

    /// Execute a SQL statement, optionally with parameter binds.
    pub async fn execute_opts(
        &self,
        sql: &str,
        opts: ExecOpts,
    ) -> Result<StatementResult, ExasolError> {
        self.count("execute");

        let Some(binds) = opts.binds else {
            let request = ExecuteRequest::new(sql).with_schema(opts.schema.as_deref());
            return Ok(self.channel().send(&request).await.map_err(QueryError::from)?);
        };

        let data = if opts.columnar {
            binds
        } else {
            transpose(binds)?
        };

        // Prepared round trip: hold the session so no other task's requests
        // land between prepare and execute.
        let _session = self.lock().await;
        let result = self
            .execute_prepared(sql, opts.schema.as_deref(), opts.column_types.as_deref(), data)
            .await?;
        Ok(result)
    }

    async fn execute_prepared(
        &self,
        sql: &str,
        schema: Option<&str>,
        column_types: Option<&[ColumnType]>,
        data: Vec<Vec<Value>>,
    ) -> Result<StatementResult, QueryError> {
        let stmt = self.statement_for(sql, schema).await?;

        let request = ExecutePreparedRequest::new(
            stmt.handle,
            overlay_types(&stmt.columns, column_types),
            data.clone(),
        );

        let result = match self.channel().send(&request).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_statement_handle_missing() => {
                // The server evicted our handle; prepare again and retry once.
                debug!(handle = stmt.handle, "statement handle evicted, re-preparing");
                self.stmt_cache.lock().await.remove(sql);
                let stmt = self.statement_for(sql, schema).await?;
                let request = ExecutePreparedRequest::new(
                    stmt.handle,
                    overlay_types(&stmt.columns, column_types),
                    data,
                );
                self.channel().send(&request).await
            }
            Err(err) => Err(err),
        };

        if !self.config().cache_prepared_statements {
            let cached: Vec<PreparedStatement> =
                self.stmt_cache.lock().await.drain().map(|(_, v)| v).collect();
            for stmt in cached {
                if let Err(e) = stmt.close(self.channel()).await {
                    warn!(handle = stmt.handle, error = %e, "failed to close prepared statement");
                }
            }
        }

        Ok(result?)
    }

    /// Fetch the cached statement for `sql`, preparing one on a miss.
    async fn statement_for(
        &self,
        sql: &str,
        schema: Option<&str>,
    ) -> Result<PreparedStatement, QueryError> {
        let mut cache = self.stmt_cache.lock().await;
        if let Some(stmt) = cache.get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = PreparedStatement::prepare(self.channel(), sql, schema).await?;
        cache.insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }

    pub async fn commit(&self) -> Result<(), ExasolError> {
        self.execute("COMMIT").await.map(|_| ())
    }

    pub async fn rollback(&self) -> Result<(), ExasolError> {
        self.execute("ROLLBACK").await.map(|_| ())
    }

    pub async fn enable_autocommit(&self) -> Result<(), ExasolError> {
        self.set_attributes(Attributes {
            autocommit: Some(true),
            ..Attributes::default()
        })
        .await
    }

    pub async fn disable_autocommit(&self) -> Result<(), ExasolError> {
        self.set_attributes(Attributes {
            autocommit: Some(false),
            ..Attributes::default()
        })
        .await
    }

    /// Set the server-side query timeout, in seconds.
    pub async fn set_timeout(&self, seconds: u32) -> Result<(), ExasolError> {
        self.set_attributes(Attributes {
            query_timeout: Some(seconds),
            ..Attributes::default()
        })
        .await
    }

    /// Read back the current session attributes.
    pub async fn get_session_attributes(&self) -> Result<Attributes, ExasolError> {
        self.count("get_session_attributes");
        Ok(self
            .channel()
            .send(&GetAttributesRequest::new())
            .await
            .map_err(QueryError::from)?)
    }

    /// Double-quote an identifier, escaping embedded quotes.
    pub fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

fn overlay_types(
    columns: &[crate::transport::messages::ColumnDef],
    column_types: Option<&[ColumnType]>,
) -> Vec<crate::transport::messages::ColumnDef> {
    let mut columns = columns.to_vec();
    if let Some(types) = column_types {
        for (col, t) in columns.iter_mut().zip(types) {
            col.data_type = t.clone();
        }
    }
    columns
}

/// Turn row-major bind rows into the wire's column-major layout.
pub(crate) fn transpose(rows: Vec<Vec<Value>>) -> Result<Vec<Vec<Value>>, QueryError> {
    let Some(width) = rows.first().map(Vec::len) else {
        return Ok(Vec::new());
    };

    let mut columns = vec![Vec::with_capacity(rows.len()); width];
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != width {
            return Err(QueryError::JaggedBinds {
                row: i,
                expected: width,
                found: row.len(),
            });
        }
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }
    Ok(columns)
}

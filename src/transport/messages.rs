//! WebSocket message types for the Exasol protocol.
//!
//! This module defines the JSON message structures used in Exasol's WebSocket
//! API (protocol version 1). Requests carry a `command` discriminator; every
//! response is wrapped in the envelope handled by [`crate::transport::channel`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version spoken during login.
pub const PROTOCOL_VERSION: u16 = 1;

/// Session attributes shared by several request kinds.
///
/// All fields are optional; unset fields are omitted from the wire so that a
/// request only touches the attributes it names. `autocommit: Some(false)` is
/// serialized explicitly, which Go-style omit-empty encodings get wrong.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autocommit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_timeout: Option<u32>,
}

impl Attributes {
    pub fn is_empty(&self) -> bool {
        *self == Attributes::default()
    }
}

/// Login request opening the protocol negotiation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub command: String,
    pub protocol_version: u16,
}

impl LoginRequest {
    pub fn new() -> Self {
        Self {
            command: "login".to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

impl Default for LoginRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// RSA public key material returned by the login request, hex-encoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    pub public_key_modulus: String,
    pub public_key_exponent: String,
}

/// Credential submission following the login request.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub username: String,
    /// RSA-encrypted, base64-encoded password
    pub password: String,
    pub use_compression: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_os_username: Option<String>,
    pub attributes: Attributes,
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_name", &self.client_name)
            .finish()
    }
}

/// Direct SQL execution request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    pub sql_text: String,
}

impl ExecuteRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            command: "execute".to_string(),
            attributes: Attributes::default(),
            sql_text: sql.into(),
        }
    }

    pub fn with_schema(mut self, schema: Option<&str>) -> Self {
        self.attributes.current_schema = schema.map(str::to_string);
        self
    }
}

/// Create a server-side prepared statement for the given SQL text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePreparedRequest {
    pub command: String,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    pub sql_text: String,
}

impl CreatePreparedRequest {
    pub fn new(sql: impl Into<String>, schema: Option<&str>) -> Self {
        Self {
            command: "createPreparedStatement".to_string(),
            attributes: Attributes {
                current_schema: schema.map(str::to_string),
                ..Attributes::default()
            },
            sql_text: sql.into(),
        }
    }
}

/// Execute a prepared statement with column-major bind data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePreparedRequest {
    pub command: String,
    pub statement_handle: i64,
    pub num_columns: usize,
    pub num_rows: usize,
    pub columns: Vec<ColumnDef>,
    /// One inner vector per column, each `num_rows` long
    pub data: Vec<Vec<Value>>,
}

impl ExecutePreparedRequest {
    pub fn new(statement_handle: i64, columns: Vec<ColumnDef>, data: Vec<Vec<Value>>) -> Self {
        let num_columns = data.len();
        let num_rows = data.first().map(Vec::len).unwrap_or(0);
        Self {
            command: "executePreparedStatement".to_string(),
            statement_handle,
            num_columns,
            num_rows,
            columns,
            data,
        }
    }
}

/// Release a server-side prepared statement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosePreparedRequest {
    pub command: String,
    pub statement_handle: i64,
}

impl ClosePreparedRequest {
    pub fn new(statement_handle: i64) -> Self {
        Self {
            command: "closePreparedStatement".to_string(),
            statement_handle,
        }
    }
}

/// Fetch a chunk of a pending result set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub command: String,
    pub result_set_handle: i64,
    pub start_position: u64,
    pub num_bytes: u64,
}

impl FetchRequest {
    pub fn new(result_set_handle: i64, start_position: u64, num_bytes: u64) -> Self {
        Self {
            command: "fetch".to_string(),
            result_set_handle,
            start_position,
            num_bytes,
        }
    }
}

/// Release one or more server-side result sets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResultSetRequest {
    pub command: String,
    pub result_set_handles: Vec<i64>,
}

impl CloseResultSetRequest {
    pub fn new(handles: Vec<i64>) -> Self {
        Self {
            command: "closeResultSet".to_string(),
            result_set_handles: handles,
        }
    }
}

/// Update session attributes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAttributesRequest {
    pub command: String,
    pub attributes: Attributes,
}

impl SetAttributesRequest {
    pub fn new(attributes: Attributes) -> Self {
        Self {
            command: "setAttributes".to_string(),
            attributes,
        }
    }
}

/// Read back current session attributes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAttributesRequest {
    pub command: String,
}

impl GetAttributesRequest {
    pub fn new() -> Self {
        Self {
            command: "getAttributes".to_string(),
        }
    }
}

impl Default for GetAttributesRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminate the session. Acknowledgement-only response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest {
    pub command: String,
}

impl DisconnectRequest {
    pub fn new() -> Self {
        Self {
            command: "disconnect".to_string(),
        }
    }
}

impl Default for DisconnectRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload of `execute` and `executePreparedStatement` responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResult {
    pub num_results: i64,
    pub results: Vec<SqlResult>,
}

/// One result entry of a statement response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlResult {
    pub result_type: String,
    #[serde(default)]
    pub row_count: Option<i64>,
    #[serde(default)]
    pub result_set: Option<ResultSetInfo>,
}

/// Server-side result set description, possibly with inline data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetInfo {
    #[serde(default)]
    pub result_set_handle: Option<i64>,
    pub num_rows: u64,
    #[serde(default)]
    pub num_rows_in_message: Option<u64>,
    #[serde(default)]
    pub num_columns: Option<usize>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    /// Column-major: one inner vector per column
    #[serde(default)]
    pub data: Option<Vec<Vec<Value>>>,
}

/// Payload of a `fetch` response. Data is column-major like inline data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedChunk {
    pub num_rows: u64,
    pub data: Vec<Vec<Value>>,
}

/// Payload of a `createPreparedStatement` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedInfo {
    pub statement_handle: i64,
    #[serde(default)]
    pub parameter_data: Option<ParameterData>,
}

/// Parameter column descriptors of a prepared statement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterData {
    pub num_columns: usize,
    pub columns: Vec<ColumnDef>,
}

/// Column descriptor, serialized back verbatim in `executePreparedStatement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    pub data_type: ColumnType,
}

/// Wire description of a column's data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnType {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub precision: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scale: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub character_set: Option<String>,
}

impl ColumnType {
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            size: None,
            precision: None,
            scale: None,
            character_set: None,
        }
    }
}

/// Exception block attached to non-success responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    pub text: String,
    #[serde(default)]
    pub sql_code: Option<String>,
}

/// Response envelope common to every request kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status: String,
    #[serde(default)]
    pub response_data: Option<Value>,
    #[serde(default)]
    pub attributes: Option<Value>,
    #[serde(default)]
    pub exception: Option<ExceptionInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_serialization() {
        let json = serde_json::to_string(&LoginRequest::new()).unwrap();
        assert!(json.contains("\"command\":\"login\""));
        assert!(json.contains("\"protocolVersion\":1"));
    }

    #[test]
    fn test_execute_request_serialization() {
        let request = ExecuteRequest::new("SELECT 1").with_schema(Some("TEST"));
        let json = serde_json::to_string(&request).unwrap();

        assert!(json.contains("\"command\":\"execute\""));
        assert!(json.contains("\"sqlText\":\"SELECT 1\""));
        assert!(json.contains("\"currentSchema\":\"TEST\""));
        assert!(!json.contains("autocommit"));
    }

    #[test]
    fn test_execute_request_omits_empty_attributes() {
        let json = serde_json::to_string(&ExecuteRequest::new("SELECT 1")).unwrap();
        assert!(!json.contains("attributes"));
    }

    #[test]
    fn test_autocommit_false_is_not_dropped() {
        let request = SetAttributesRequest::new(Attributes {
            autocommit: Some(false),
            ..Attributes::default()
        });
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"autocommit\":false"));
    }

    #[test]
    fn test_fetch_request_serialization() {
        let request = FetchRequest::new(7, 1000, 64 * 1024 * 1024);
        let json = serde_json::to_string(&request).unwrap();

        assert!(json.contains("\"command\":\"fetch\""));
        assert!(json.contains("\"resultSetHandle\":7"));
        assert!(json.contains("\"startPosition\":1000"));
        assert!(json.contains("\"numBytes\":67108864"));
    }

    #[test]
    fn test_execute_prepared_request_shape() {
        let columns = vec![ColumnDef {
            name: Some("ID".to_string()),
            data_type: ColumnType::named("DECIMAL"),
        }];
        let data = vec![vec![serde_json::json!(1), serde_json::json!(2)]];
        let request = ExecutePreparedRequest::new(42, columns, data);

        assert_eq!(request.num_columns, 1);
        assert_eq!(request.num_rows, 2);

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"command\":\"executePreparedStatement\""));
        assert!(json.contains("\"statementHandle\":42"));
        assert!(json.contains("\"type\":\"DECIMAL\""));
    }

    #[test]
    fn test_auth_request_no_password_leak_in_debug() {
        let request = AuthRequest {
            username: "sys".to_string(),
            password: "c2VjcmV0".to_string(),
            use_compression: false,
            client_name: None,
            driver_name: Some("exastream".to_string()),
            client_os: None,
            client_os_username: None,
            attributes: Attributes::default(),
        };
        let debug = format!("{:?}", request);
        assert!(!debug.contains("c2VjcmV0"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_statement_result_deserialization() {
        let json = r#"{
            "numResults": 1,
            "results": [
                {
                    "resultType": "resultSet",
                    "resultSet": {
                        "resultSetHandle": 3,
                        "numRows": 2,
                        "numRowsInMessage": 2,
                        "numColumns": 2,
                        "columns": [
                            {"name": "ID", "dataType": {"type": "DECIMAL", "precision": 18, "scale": 0}},
                            {"name": "NAME", "dataType": {"type": "VARCHAR", "size": 100, "characterSet": "UTF8"}}
                        ],
                        "data": [[1, 2], ["Alice", "Bob"]]
                    }
                }
            ]
        }"#;

        let result: StatementResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.num_results, 1);

        let rs = result.results[0].result_set.as_ref().unwrap();
        assert_eq!(rs.result_set_handle, Some(3));
        assert_eq!(rs.num_rows, 2);
        assert_eq!(rs.columns.len(), 2);
        assert_eq!(rs.columns[0].data_type.type_name, "DECIMAL");

        // Wire data is column-major
        let data = rs.data.as_ref().unwrap();
        assert_eq!(data[0], vec![serde_json::json!(1), serde_json::json!(2)]);
    }

    #[test]
    fn test_row_count_result_deserialization() {
        let json = r#"{"numResults": 1, "results": [{"resultType": "rowCount", "rowCount": 5}]}"#;
        let result: StatementResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.results[0].row_count, Some(5));
        assert!(result.results[0].result_set.is_none());
    }

    #[test]
    fn test_prepared_info_deserialization() {
        let json = r#"{
            "statementHandle": 99,
            "parameterData": {
                "numColumns": 1,
                "columns": [{"dataType": {"type": "VARCHAR", "size": 20}}]
            }
        }"#;
        let info: PreparedInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.statement_handle, 99);
        assert_eq!(info.parameter_data.unwrap().columns.len(), 1);
    }

    #[test]
    fn test_envelope_error_deserialization() {
        let json = r#"{
            "status": "error",
            "exception": {"text": "syntax error", "sqlCode": "42000"}
        }"#;
        let envelope: ResponseEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.status, "error");
        assert_eq!(envelope.exception.unwrap().sql_code.unwrap(), "42000");
    }
}

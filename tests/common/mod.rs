//! Common test utilities for exastream integration tests.
//!
//! # Integration Test Prerequisites
//!
//! These integration tests require a running Exasol database instance.
//! The recommended approach is to use the Exasol Docker image:
//!
//! ```bash
//! docker run -d --name exasol-test \
//!   -p 8563:8563 \
//!   --privileged \
//!   exasol/docker-db:latest
//! ```
//!
//! Wait for the database to be ready (may take 1-2 minutes on first run).
//!
//! # Configuration
//!
//! Tests use the following defaults which can be overridden via environment
//! variables:
//!
//! | Default Constant   | Environment Variable | Default Value |
//! |--------------------|----------------------|---------------|
//! | `DEFAULT_HOST`     | `EXASOL_HOST`        | "localhost"   |
//! | `DEFAULT_PORT`     | `EXASOL_PORT`        | 8563          |
//! | `DEFAULT_USER`     | `EXASOL_USER`        | "sys"         |
//! | `DEFAULT_PASSWORD` | `EXASOL_PASSWORD`    | "exasol"      |
//!
//! # Test Cleanup
//!
//! Tests clean up after themselves by dropping any created schemas. Schema
//! names carry a timestamp so parallel runs do not collide.

use std::env;
use std::sync::Once;
use std::time::{SystemTime, UNIX_EPOCH};

use exastream::{ConnectConfig, Connection};

static TRACING: Once = Once::new();

/// Route client logs through the test harness, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().init();
    });
}

/// Default host for Exasol database connection.
pub const DEFAULT_HOST: &str = "localhost";

/// Default port for Exasol database connection.
pub const DEFAULT_PORT: u16 = 8563;

/// Default username for Exasol database connection.
pub const DEFAULT_USER: &str = "sys";

/// Default password for Exasol database connection.
pub const DEFAULT_PASSWORD: &str = "exasol";

pub fn get_host() -> String {
    env::var("EXASOL_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string())
}

pub fn get_port() -> u16 {
    env::var("EXASOL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

pub fn get_user() -> String {
    env::var("EXASOL_USER").unwrap_or_else(|_| DEFAULT_USER.to_string())
}

pub fn get_password() -> String {
    env::var("EXASOL_PASSWORD").unwrap_or_else(|_| DEFAULT_PASSWORD.to_string())
}

/// Connection config pointed at the test database.
pub fn test_connect_config() -> ConnectConfig {
    ConnectConfig::builder()
        .host(get_host())
        .port(get_port())
        .username(get_user())
        .password(get_password())
        .client_name("exastream-tests")
        .timeout(60)
        .build()
        .expect("test config must be valid")
}

/// Connect to the test database.
pub async fn get_test_connection() -> Connection {
    init_tracing();
    Connection::connect(test_connect_config())
        .await
        .expect("failed to connect to test Exasol instance")
}

/// A schema name unique to this test invocation.
pub fn generate_test_schema_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .subsec_nanos();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_millis();
    format!("EXASTREAM_TEST_{}_{}", millis, nanos)
}

//! Connection configuration.

use crate::error::ConnectionError;

/// Settings for opening an Exasol session.
///
/// Build with [`ConnectConfig::builder`]. The password never appears in
/// `Debug` output.
#[derive(Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Reported to the server as the client name
    pub client_name: Option<String>,
    /// Query/bulk timeout in seconds; 0 disables timeouts
    pub timeout: u32,
    /// Log server errors at debug instead of error level
    pub suppress_errors: bool,
    /// Reuse server-side prepared statements across executions
    pub cache_prepared_statements: bool,
}

impl ConnectConfig {
    pub fn builder() -> ConnectConfigBuilder {
        ConnectConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<(), ConnectionError> {
        if self.host.is_empty() {
            return Err(ConnectionError::InvalidParameter {
                parameter: "host".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.username.is_empty() {
            return Err(ConnectionError::InvalidParameter {
                parameter: "username".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_name", &self.client_name)
            .field("timeout", &self.timeout)
            .field("suppress_errors", &self.suppress_errors)
            .field("cache_prepared_statements", &self.cache_prepared_statements)
            .finish()
    }
}

/// Builder for [`ConnectConfig`].
#[derive(Clone)]
pub struct ConnectConfigBuilder {
    host: String,
    port: u16,
    username: String,
    password: String,
    client_name: Option<String>,
    timeout: u32,
    suppress_errors: bool,
    cache_prepared_statements: bool,
}

impl Default for ConnectConfigBuilder {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8563,
            username: String::new(),
            password: String::new(),
            client_name: None,
            timeout: 0,
            suppress_errors: false,
            cache_prepared_statements: true,
        }
    }
}

impl ConnectConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    /// Timeout in seconds applied to queries and bulk transfers; 0 disables.
    pub fn timeout(mut self, seconds: u32) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn suppress_errors(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }

    pub fn cache_prepared_statements(mut self, cache: bool) -> Self {
        self.cache_prepared_statements = cache;
        self
    }

    pub fn build(self) -> Result<ConnectConfig, ConnectionError> {
        let config = ConnectConfig {
            host: self.host,
            port: self.port,
            username: self.username,
            password: self.password,
            client_name: self.client_name,
            timeout: self.timeout,
            suppress_errors: self.suppress_errors,
            cache_prepared_statements: self.cache_prepared_statements,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConnectConfig::builder()
            .host("localhost")
            .username("sys")
            .password("exasol")
            .build()
            .unwrap();

        assert_eq!(config.port, 8563);
        assert_eq!(config.timeout, 0);
        assert!(!config.suppress_errors);
        assert!(config.cache_prepared_statements);
    }

    #[test]
    fn test_builder_rejects_empty_host() {
        let err = ConnectConfig::builder()
            .username("sys")
            .password("exasol")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::InvalidParameter { parameter, .. } if parameter == "host"
        ));
    }

    #[test]
    fn test_builder_rejects_empty_username() {
        let err = ConnectConfig::builder()
            .host("localhost")
            .password("exasol")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::InvalidParameter { parameter, .. } if parameter == "username"
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectConfig::builder()
            .host("localhost")
            .username("sys")
            .password("hunter2")
            .build()
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted"));
    }
}

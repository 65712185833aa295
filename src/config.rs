//! Provider configuration.
//!
//! The provider block carries the Druid router endpoint, optional basic-auth
//! credentials and the HTTP timeout. Unset values fall back to the
//! `DRUID_ENDPOINT`, `DRUID_USERNAME` and `DRUID_PASSWORD` environment
//! variables.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Environment variable consulted when `endpoint` is not configured.
pub const ENDPOINT_ENV: &str = "DRUID_ENDPOINT";
/// Environment variable consulted when `username` is not configured.
pub const USERNAME_ENV: &str = "DRUID_USERNAME";
/// Environment variable consulted when `password` is not configured.
pub const PASSWORD_ENV: &str = "DRUID_PASSWORD";
/// Default HTTP client timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings used to build the Druid control-plane client.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Router endpoint with scheme and port, e.g. `http://localhost:8888`.
    #[serde(default)]
    pub endpoint: String,
    /// Basic-auth username.
    #[serde(default)]
    pub username: String,
    /// Basic-auth password.
    #[serde(default)]
    pub password: String,
    /// HTTP client timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a configuration for the given endpoint with default settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: String::new(),
            password: String::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the HTTP timeout in seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    /// Parse the provider block, filling unset values from the process environment.
    pub fn from_value(config: Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(config, |key| std::env::var(key).ok())
    }

    /// Parse the provider block with an explicit environment lookup.
    pub fn from_value_with_env<F>(config: Value, env: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = match config {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let mut parsed: ProviderConfig = serde_json::from_value(config)
            .map_err(|e| ProviderError::Configuration(format!("invalid provider block: {}", e)))?;

        fill_from_env(&mut parsed.endpoint, ENDPOINT_ENV, &env);
        fill_from_env(&mut parsed.username, USERNAME_ENV, &env);
        fill_from_env(&mut parsed.password, PASSWORD_ENV, &env);
        Ok(parsed)
    }

    /// Credentials to attach, present only when both halves are configured.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }

    /// The HTTP timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Check the configuration, returning diagnostics for every problem found.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if self.endpoint.is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing required attribute 'endpoint'")
                    .with_detail(format!("Set `endpoint` or the {} environment variable", ENDPOINT_ENV))
                    .with_attribute("endpoint"),
            );
        } else {
            match reqwest::Url::parse(&self.endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {},
                Ok(url) => diagnostics.push(
                    Diagnostic::error("Unsupported endpoint scheme")
                        .with_detail(format!("Expected http or https, got {}", url.scheme()))
                        .with_attribute("endpoint"),
                ),
                Err(e) => diagnostics.push(
                    Diagnostic::error("Invalid endpoint URL")
                        .with_detail(e.to_string())
                        .with_attribute("endpoint"),
                ),
            }
        }

        if self.timeout == 0 {
            diagnostics.push(
                Diagnostic::error("Value for 'timeout' is out of range")
                    .with_detail("Expected at least 1 second")
                    .with_attribute("timeout"),
            );
        }

        if self.username.is_empty() != self.password.is_empty() {
            diagnostics.push(
                Diagnostic::warning("Incomplete credentials")
                    .with_detail("Basic auth is only sent when both username and password are set"),
            );
        }

        diagnostics
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Connection settings for the Druid router")
            .with_attribute(
                "endpoint",
                Attribute::optional_string()
                    .with_description("Druid router endpoint URL with port (e.g., http://localhost:8888)"),
            )
            .with_attribute(
                "username",
                Attribute::optional_string().with_description("Username for Druid authentication"),
            )
            .with_attribute(
                "password",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Password for Druid authentication"),
            )
            .with_attribute(
                "timeout",
                Attribute::optional_int64()
                    .with_min_value(1)
                    .with_default(Value::from(DEFAULT_TIMEOUT_SECS))
                    .with_description("HTTP client timeout in seconds"),
            )
    }
}

fn fill_from_env<F>(field: &mut String, key: &str, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if field.is_empty() {
        if let Some(value) = env(key) {
            *field = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_full_configuration() {
        let config = ProviderConfig::from_value_with_env(
            json!({
                "endpoint": "http://localhost:8888",
                "username": "admin",
                "password": "secret",
                "timeout": 60
            }),
            no_env,
        )
        .unwrap();

        assert_eq!(config.endpoint, "http://localhost:8888");
        assert_eq!(config.basic_auth(), Some(("admin", "secret")));
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.diagnostics().is_empty());
    }

    #[test]
    fn test_minimal_configuration_uses_defaults() {
        let config =
            ProviderConfig::from_value_with_env(json!({"endpoint": "http://druid:8888"}), no_env)
                .unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.basic_auth(), None);
    }

    #[test]
    fn test_environment_fallbacks() {
        let env = |key: &str| match key {
            ENDPOINT_ENV => Some("https://druid.example.com:8888".to_string()),
            USERNAME_ENV => Some("env-user".to_string()),
            PASSWORD_ENV => Some("env-pass".to_string()),
            _ => None,
        };

        let config = ProviderConfig::from_value_with_env(Value::Null, env).unwrap();
        assert_eq!(config.endpoint, "https://druid.example.com:8888");
        assert_eq!(config.basic_auth(), Some(("env-user", "env-pass")));

        // Explicit values win over the environment.
        let config =
            ProviderConfig::from_value_with_env(json!({"username": "explicit"}), env).unwrap();
        assert_eq!(config.username, "explicit");
    }

    #[test]
    fn test_partial_credentials_skip_auth() {
        let config = ProviderConfig::new("http://druid:8888").with_credentials("admin", "");
        assert_eq!(config.basic_auth(), None);

        let diagnostics = config.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
    }

    #[test]
    fn test_invalid_configuration_diagnostics() {
        let diagnostics = ProviderConfig::new("").diagnostics();
        assert_eq!(diagnostics[0].attribute, Some("endpoint".to_string()));

        let diagnostics = ProviderConfig::new("not a url").diagnostics();
        assert_eq!(diagnostics[0].summary, "Invalid endpoint URL");

        let diagnostics = ProviderConfig::new("ftp://druid").diagnostics();
        assert_eq!(diagnostics[0].summary, "Unsupported endpoint scheme");

        let diagnostics = ProviderConfig::new("http://druid:8888").with_timeout(0).diagnostics();
        assert_eq!(diagnostics[0].attribute, Some("timeout".to_string()));
    }

    #[test]
    fn test_wrong_types_are_configuration_errors() {
        let err = ProviderConfig::from_value_with_env(json!({"timeout": "soon"}), no_env)
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ProviderConfig::new("http://druid:8888").with_credentials("admin", "hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_schema_marks_password_sensitive() {
        let schema = ProviderConfig::schema();
        assert!(schema.block.attributes["password"].flags.sensitive);
        assert_eq!(schema.block.attributes["timeout"].default, Some(json!(30)));
    }
}

//! Error types for the Druid provider.

use thiserror::Error;

/// Errors that can occur while configuring the provider or reconciling a supervisor.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal provider error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request could not be completed.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The Druid control API rejected the request.
    #[error("Druid API error (status {status}): {body}")]
    Api {
        /// HTTP status code returned by Druid.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Operation timed out.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operation was cancelled before the remote call completed.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// For [`ProviderError::Api`] this is the raw response body.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Sdk(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Transport(_err) => "transport error (see Debug output)",
            Self::Api { body, .. } => body,
            Self::DeadlineExceeded(msg) => msg,
            Self::Cancelled(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Build an API rejection from a status code and body text.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// The HTTP status carried by an API rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Convert a transport failure, splitting out timeouts.
    pub(crate) fn from_transport(err: reqwest::Error, operation: &str) -> Self {
        if err.is_timeout() {
            Self::DeadlineExceeded(format!("{}: {}", operation, err))
        } else {
            Self::Transport(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("orders-supervisor".to_string());
        assert_eq!(format!("{}", err), "Resource not found: orders-supervisor");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("druid_lookup".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: druid_lookup");
    }

    #[test]
    fn test_api_error_carries_status_and_body() {
        let err = ProviderError::api(400, r#"{"error": "Invalid supervisor spec"}"#);
        assert_eq!(
            format!("{}", err),
            r#"Druid API error (status 400): {"error": "Invalid supervisor spec"}"#
        );
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.message(), r#"{"error": "Invalid supervisor spec"}"#);
    }

    #[test]
    fn test_cancel_and_deadline_display() {
        let err = ProviderError::Cancelled("read supervisor".to_string());
        assert_eq!(format!("{}", err), "Cancelled: read supervisor");
        assert_eq!(err.status(), None);

        let err = ProviderError::DeadlineExceeded("timeout".to_string());
        assert_eq!(format!("{}", err), "Deadline exceeded: timeout");
    }

    #[test]
    fn test_serialization_from() {
        let err: ProviderError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, ProviderError::Serialization(_)));
        assert_eq!(err.message(), "serialization error (see Debug output)");
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("endpoint is required".to_string());
        assert_eq!(err.message(), "endpoint is required");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }
}

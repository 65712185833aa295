//! Druid supervisor control API.
//!
//! [`SupervisorApi`] is the capability the reconciler depends on: the five
//! remote operations on `/druid/indexer/v1/supervisor`. [`DruidClient`] is
//! the HTTP implementation.
//!
//! Every call takes a [`CancellationToken`]; when it fires the in-flight
//! request is dropped and the call fails with [`ProviderError::Cancelled`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// Path of the supervisor collection below the router endpoint.
pub const SUPERVISOR_PATH: &str = "druid/indexer/v1/supervisor";

/// Status document returned by `GET /supervisor/{id}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    /// Supervisor id.
    pub id: String,
    /// Engine-defined state, e.g. `RUNNING` or `SUSPENDED`.
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct SupervisorResponse {
    id: String,
}

/// The remote operations on a supervisor.
#[async_trait]
pub trait SupervisorApi: Send + Sync {
    /// Submit a supervisor spec (create or update). Returns the supervisor id.
    async fn create_or_update(
        &self,
        spec: &Value,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;

    /// Fetch the status of a supervisor. `Ok(None)` means it does not exist.
    async fn status(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SupervisorStatus>, ProviderError>;

    /// Terminate a supervisor. A missing supervisor counts as terminated.
    async fn terminate(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError>;

    /// Suspend a running supervisor.
    async fn suspend(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError>;

    /// Resume a suspended supervisor.
    async fn resume(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError>;
}

#[async_trait]
impl<T: SupervisorApi + ?Sized> SupervisorApi for Arc<T> {
    async fn create_or_update(
        &self,
        spec: &Value,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        (**self).create_or_update(spec, cancel).await
    }

    async fn status(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SupervisorStatus>, ProviderError> {
        (**self).status(id, cancel).await
    }

    async fn terminate(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        (**self).terminate(id, cancel).await
    }

    async fn suspend(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        (**self).suspend(id, cancel).await
    }

    async fn resume(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        (**self).resume(id, cancel).await
    }
}

/// HTTP client for the Druid router.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct DruidClient {
    http: reqwest::Client,
    base: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for DruidClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DruidClient")
            .field("base", &self.base)
            .field("basic_auth", &!self.username.is_empty())
            .finish()
    }
}

impl DruidClient {
    /// Build a client from the provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_http_client(http, config))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_http_client(http: reqwest::Client, config: &ProviderConfig) -> Self {
        let (username, password) = config
            .basic_auth()
            .map(|(u, p)| (u.to_string(), p.to_string()))
            .unwrap_or_default();
        Self {
            http,
            base: format!("{}/{}", config.endpoint.trim_end_matches('/'), SUPERVISOR_PATH),
            username,
            password,
        }
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        for segment in segments {
            url.push('/');
            url.push_str(segment);
        }
        url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        if self.username.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.username, Some(&self.password))
        }
    }

    /// Send a request and read the body, honouring the cancellation token.
    async fn send(
        &self,
        builder: RequestBuilder,
        operation: &str,
        cancel: &CancellationToken,
    ) -> Result<(StatusCode, String), ProviderError> {
        cancellable(cancel, operation, async {
            let response = builder
                .send()
                .await
                .map_err(|e| ProviderError::from_transport(e, operation))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::from_transport(e, operation))?;
            Ok((status, body))
        })
        .await
    }

    /// POST an empty body to `/{id}/{action}`.
    async fn post_action(
        &self,
        id: &str,
        action: &str,
        tolerate_missing: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let url = self.url(&[id, action]);
        debug!(%url, "POST supervisor {}", action);
        let (status, body) = self.send(self.request(Method::POST, &url), action, cancel).await?;

        if status == StatusCode::NOT_FOUND && tolerate_missing {
            warn!(supervisor_id = %id, "Supervisor already absent");
            return Ok(());
        }
        check_status(status, body).map(|_| ())
    }
}

#[async_trait]
impl SupervisorApi for DruidClient {
    async fn create_or_update(
        &self,
        spec: &Value,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let url = self.url(&[]);
        debug!(%url, "POST supervisor spec");
        let builder = self.request(Method::POST, &url).json(spec);
        let (status, body) = self.send(builder, "submit supervisor", cancel).await?;
        let body = check_status(status, body)?;

        let response: SupervisorResponse = serde_json::from_str(&body)?;
        Ok(response.id)
    }

    async fn status(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SupervisorStatus>, ProviderError> {
        let url = self.url(&[id, "status"]);
        debug!(%url, "GET supervisor status");
        let (status, body) = self
            .send(self.request(Method::GET, &url), "read supervisor", cancel)
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = check_status(status, body)?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn terminate(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        self.post_action(id, "terminate", true, cancel).await
    }

    async fn suspend(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        self.post_action(id, "suspend", false, cancel).await
    }

    async fn resume(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        self.post_action(id, "resume", false, cancel).await
    }
}

/// Any status of 400 or above is a rejection carrying the raw body.
fn check_status(status: StatusCode, body: String) -> Result<String, ProviderError> {
    if status.as_u16() >= 400 {
        Err(ProviderError::api(status.as_u16(), body))
    } else {
        Ok(body)
    }
}

/// Race a future against a cancellation token.
pub async fn cancellable<T, F>(
    cancel: &CancellationToken,
    operation: &str,
    future: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled(operation.to_string())),
        result = future => result,
    }
}

//! The provider protocol surface.
//!
//! [`ProviderService`] is the set of operations a declarative engine drives:
//! schema discovery, provider configuration, resource validation, planning,
//! CRUD and import. [`TracedProvider`] wraps any implementation and logs
//! every call inside a tracing span.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata};

/// Operations a provider exposes to the declarative engine.
///
/// # Example
///
/// ```ignore
/// use druid_provider::{ProviderService, ProviderError, PlanResult, ProviderSchema};
/// use druid_provider::schema::Diagnostic;
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl ProviderService for MyProvider {
///     fn schema(&self) -> ProviderSchema {
///         ProviderSchema::new()
///     }
///
///     async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     // ... implement the resource operations
/// }
/// ```
#[async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Return the provider block schema and every resource schema.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata, derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.schema().resources.keys().cloned().collect(),
        }
    }

    /// Validate the provider block before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with connection settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider, aborting in-flight work.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Validate a resource configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. `proposed_state` is `Null` when deleting.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a resource and return its state.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh a resource. `Null` means the resource no longer exists.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update a resource in place and return its new state.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Bring existing infrastructure under management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Sdk(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// Logs every [`ProviderService`] call and its outcome.
#[derive(Debug, Clone)]
pub struct TracedProvider<P> {
    inner: P,
}

impl<P: ProviderService> TracedProvider<P> {
    /// Wrap a provider.
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: ProviderService> ProviderService for TracedProvider<P> {
    fn schema(&self) -> ProviderSchema {
        let schema = self.inner.schema();
        debug!(resources = schema.resources.len(), "Schema requested");
        schema
    }

    fn metadata(&self) -> ProviderMetadata {
        self.inner.metadata()
    }

    #[instrument(skip(self, config), name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        debug!("ValidateProviderConfig called");
        match self.inner.validate_provider_config(config).await {
            Ok(diagnostics) => {
                if has_errors(&diagnostics) {
                    warn!(diagnostics = diagnostics.len(), "ValidateProviderConfig completed with errors");
                } else {
                    info!("ValidateProviderConfig completed successfully");
                }
                Ok(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateProviderConfig failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        debug!("Configure called");
        match self.inner.configure(config).await {
            Ok(diagnostics) => {
                if has_errors(&diagnostics) {
                    warn!(diagnostics = diagnostics.len(), "Configure completed with errors");
                } else {
                    info!("Configure completed successfully");
                }
                Ok(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "Configure failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self), name = "provider.stop")]
    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stop called");
        match self.inner.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                Ok(())
            },
            Err(e) => {
                error!(error = %e, "Stop failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        debug!(resource_type = %resource_type, "ValidateResourceConfig called");
        match self.inner.validate_resource_config(resource_type, config).await {
            Ok(diagnostics) => {
                if has_errors(&diagnostics) {
                    warn!(
                        resource_type = %resource_type,
                        diagnostics = diagnostics.len(),
                        "ValidateResourceConfig completed with errors"
                    );
                } else {
                    info!(resource_type = %resource_type, "ValidateResourceConfig completed successfully");
                }
                Ok(diagnostics)
            },
            Err(e) => {
                error!(resource_type = %resource_type, error = %e, "ValidateResourceConfig failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, prior_state, proposed_state, config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let is_create = prior_state.is_none();
        debug!(resource_type = %resource_type, is_create = is_create, "Plan called");
        match self
            .inner
            .plan(resource_type, prior_state, proposed_state, config)
            .await
        {
            Ok(result) => {
                info!(
                    resource_type = %resource_type,
                    changes = result.changes.len(),
                    requires_replace = result.requires_replace,
                    "Plan completed"
                );
                Ok(result)
            },
            Err(e) => {
                error!(resource_type = %resource_type, error = %e, "Plan failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        info!(resource_type = %resource_type, "Create called");
        match self.inner.create(resource_type, planned_state).await {
            Ok(state) => {
                info!(resource_type = %resource_type, "Create completed successfully");
                Ok(state)
            },
            Err(e) => {
                error!(resource_type = %resource_type, error = %e, "Create failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        debug!(resource_type = %resource_type, "Read called");
        match self.inner.read(resource_type, current_state).await {
            Ok(state) => {
                debug!(resource_type = %resource_type, gone = state.is_null(), "Read completed successfully");
                Ok(state)
            },
            Err(e) => {
                error!(resource_type = %resource_type, error = %e, "Read failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        info!(resource_type = %resource_type, "Update called");
        match self.inner.update(resource_type, prior_state, planned_state).await {
            Ok(state) => {
                info!(resource_type = %resource_type, "Update completed successfully");
                Ok(state)
            },
            Err(e) => {
                error!(resource_type = %resource_type, error = %e, "Update failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        info!(resource_type = %resource_type, "Delete called");
        match self.inner.delete(resource_type, current_state).await {
            Ok(()) => {
                info!(resource_type = %resource_type, "Delete completed successfully");
                Ok(())
            },
            Err(e) => {
                error!(resource_type = %resource_type, error = %e, "Delete failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        info!(resource_type = %resource_type, id = %id, "ImportResource called");
        match self.inner.import_resource(resource_type, id).await {
            Ok(imported) => {
                info!(
                    resource_type = %resource_type,
                    id = %id,
                    imported_count = imported.len(),
                    "ImportResource completed"
                );
                Ok(imported)
            },
            Err(e) => {
                error!(resource_type = %resource_type, id = %id, error = %e, "ImportResource failed");
                Err(e)
            },
        }
    }
}

/// Convert a provider error into a single error diagnostic.
pub fn error_to_diagnostics(err: &ProviderError) -> Vec<Diagnostic> {
    vec![Diagnostic::error(err.to_string())]
}

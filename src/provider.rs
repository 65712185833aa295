//! The Druid provider: configuration, planning and the supervisor lifecycle.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{DruidClient, SupervisorApi, SupervisorStatus};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::service::{error_to_diagnostics, ProviderService};
use crate::supervisor::model::ResourceConfig;
use crate::supervisor::reconciler::{ReadOutcome, Reconciler, TrackedSupervisor};
use crate::supervisor::schema::{resource_schema, RESOURCE_TYPE};
use crate::supervisor::spec::{build_spec_value, observed_attributes};
use crate::types::{AttributeChange, ImportedResource, PlanResult};
use crate::validation::{validate, validate_result};

/// Supervisor API shared by every operation of a configured provider.
pub type SharedSupervisorApi = Arc<dyn SupervisorApi>;

/// Provider managing `druid_kafka_supervisor` resources.
///
/// Until [`configure`](ProviderService::configure) succeeds (or the provider
/// is built with [`DruidProvider::with_api`]) every remote operation fails
/// with a configuration error. [`stop`](ProviderService::stop) cancels all
/// in-flight requests.
pub struct DruidProvider {
    reconciler: RwLock<Option<Arc<Reconciler<SharedSupervisorApi>>>>,
    shutdown: CancellationToken,
}

impl Default for DruidProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DruidProvider {
    /// Create an unconfigured provider.
    pub fn new() -> Self {
        Self {
            reconciler: RwLock::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a provider that talks to the given API instead of a configured client.
    pub fn with_api(api: SharedSupervisorApi) -> Self {
        Self {
            reconciler: RwLock::new(Some(Arc::new(Reconciler::new(api)))),
            shutdown: CancellationToken::new(),
        }
    }

    /// Whether a supervisor API has been installed.
    pub fn is_configured(&self) -> bool {
        self.reconciler
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn install(&self, api: SharedSupervisorApi) -> Result<(), ProviderError> {
        let mut guard = self
            .reconciler
            .write()
            .map_err(|_| ProviderError::Sdk("provider state lock poisoned".to_string()))?;
        *guard = Some(Arc::new(Reconciler::new(api)));
        Ok(())
    }

    fn reconciler(&self) -> Result<Arc<Reconciler<SharedSupervisorApi>>, ProviderError> {
        let guard = self
            .reconciler
            .read()
            .map_err(|_| ProviderError::Sdk("provider state lock poisoned".to_string()))?;
        guard.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }

    fn cancellation(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

fn check_resource_type(resource_type: &str) -> Result<(), ProviderError> {
    if resource_type == RESOURCE_TYPE {
        Ok(())
    } else {
        Err(ProviderError::UnknownResource(resource_type.to_string()))
    }
}

fn tracked_from_state(state: &Value) -> TrackedSupervisor {
    let text = |key: &str| {
        state
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    TrackedSupervisor {
        id: text("id").or_else(|| text("supervisor_id")),
        state: text("state"),
    }
}

/// Declared attributes plus the computed attributes of an observed supervisor.
fn resource_state(config: &ResourceConfig, status: &SupervisorStatus) -> Result<Value, ProviderError> {
    let mut state = config.to_value()?;
    if let Value::Object(map) = &mut state {
        map.extend(observed_attributes(status));
    }
    Ok(state)
}

/// Parse a planned state, refusing one that would submit an invalid spec.
fn checked_config(state: &Value) -> Result<ResourceConfig, ProviderError> {
    validate_result(&resource_schema(), state).map_err(|diagnostics| {
        let summaries: Vec<&str> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        ProviderError::Validation(summaries.join("; "))
    })?;
    ResourceConfig::from_value(state)
}

fn declares_datasource(state: &Value) -> bool {
    state
        .get("datasource")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// Merge the observed attributes into a state without parsing its declared part.
fn with_observed(state: Value, status: &SupervisorStatus) -> Value {
    let mut map = match state {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.extend(observed_attributes(status));
    Value::Object(map)
}

/// Built spec with the suspension flag masked, used to detect real spec changes.
fn spec_ignoring_suspension(config: &ResourceConfig) -> Result<Value, ProviderError> {
    let mut config = config.clone();
    config.suspended = false;
    build_spec_value(&config)
}

#[async_trait]
impl ProviderService for DruidProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(RESOURCE_TYPE, resource_schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        match ProviderConfig::from_value(config) {
            Ok(config) => Ok(config.diagnostics()),
            Err(e) => Ok(error_to_diagnostics(&e)),
        }
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?;
        let diagnostics = config.diagnostics();
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let client = match DruidClient::new(&config) {
            Ok(client) => client,
            Err(e) => return Ok(error_to_diagnostics(&e)),
        };
        self.install(Arc::new(client))?;
        info!(endpoint = %config.endpoint, timeout = config.timeout, "Druid provider configured");
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.shutdown.cancel();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        check_resource_type(resource_type)?;
        Ok(validate(&resource_schema(), &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        check_resource_type(resource_type)?;
        let schema = resource_schema();
        let computed: Vec<&str> = schema.computed_attributes().collect();
        let prior = prior_state.unwrap_or(Value::Null);

        if proposed_state.is_null() {
            let changes = AttributeChange::diff(&prior, &Value::Null, &computed);
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let mut planned = ResourceConfig::from_value(&proposed_state)?.to_value()?;
        let changes = AttributeChange::diff(&prior, &planned, &computed);
        let requires_replace = !prior.is_null()
            && changes
                .iter()
                .any(|change| schema.force_new_attributes().any(|name| name == change.path));

        // Identity survives an in-place update; a replacement gets a new one.
        if !requires_replace {
            if let (Value::Object(planned), Value::Object(prior)) = (&mut planned, &prior) {
                for name in &computed {
                    if let Some(value) = prior.get(*name) {
                        planned.insert(name.to_string(), value.clone());
                    }
                }
            }
        }

        debug!(changes = changes.len(), requires_replace, "Planned supervisor");
        if changes.is_empty() {
            Ok(PlanResult::no_change(planned))
        } else {
            Ok(PlanResult::with_changes(planned, changes, requires_replace))
        }
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let config = checked_config(&planned_state)?;
        let reconciler = self.reconciler()?;
        let cancel = self.cancellation();

        let mut tracked = TrackedSupervisor::absent();
        reconciler.create(&mut tracked, &config, &cancel).await?;

        match reconciler.read(&mut tracked, &cancel).await? {
            ReadOutcome::Present(status) => resource_state(&config, &status),
            ReadOutcome::Gone => Err(ProviderError::NotFound(format!(
                "supervisor for datasource {} disappeared after creation",
                config.datasource
            ))),
        }
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let reconciler = self.reconciler()?;

        let mut tracked = tracked_from_state(&current_state);
        let status = match reconciler.read(&mut tracked, &self.cancellation()).await? {
            ReadOutcome::Present(status) => status,
            ReadOutcome::Gone => return Ok(Value::Null),
        };

        // An imported state carries only the observed attributes.
        if !declares_datasource(&current_state) {
            return Ok(with_observed(current_state, &status));
        }
        let config = ResourceConfig::from_value(&current_state)?;
        resource_state(&config, &status)
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let prior = ResourceConfig::from_value(&prior_state)?;
        let planned = checked_config(&planned_state)?;
        let reconciler = self.reconciler()?;
        let cancel = self.cancellation();
        let mut tracked = tracked_from_state(&prior_state);

        if spec_ignoring_suspension(&prior)? != spec_ignoring_suspension(&planned)? {
            reconciler.update(&tracked, &planned, &cancel).await?;
        } else {
            debug!(id = ?tracked.id, "Supervisor spec unchanged, skipping resubmission");
        }

        if prior.suspended != planned.suspended {
            reconciler
                .apply_suspended(&tracked, planned.suspended, &cancel)
                .await?;
        }

        match reconciler.read(&mut tracked, &cancel).await? {
            ReadOutcome::Present(status) => resource_state(&planned, &status),
            ReadOutcome::Gone => Err(ProviderError::NotFound(format!(
                "supervisor for datasource {} disappeared during update",
                planned.datasource
            ))),
        }
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        check_resource_type(resource_type)?;
        let reconciler = self.reconciler()?;
        let mut tracked = tracked_from_state(&current_state);
        reconciler.delete(&mut tracked, &self.cancellation()).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        check_resource_type(resource_type)?;
        let reconciler = self.reconciler()?;
        let mut tracked = TrackedSupervisor::active(id);

        match reconciler.read(&mut tracked, &self.cancellation()).await? {
            ReadOutcome::Present(status) => Ok(vec![ImportedResource::new(
                RESOURCE_TYPE,
                Value::Object(observed_attributes(&status)),
            )]),
            ReadOutcome::Gone => Err(ProviderError::NotFound(format!("supervisor {}", id))),
        }
    }
}

//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] directly, with every call
//! going through [`TracedProvider`] the way an engine would see it.
//! [`InMemorySupervisorApi`] stands in for a Druid overlord: it assigns
//! `<datasource>-supervisor` ids, tracks `RUNNING`/`SUSPENDED` state and
//! records every call it receives.
//!
//! # Example
//!
//! ```ignore
//! use druid_provider::testing::ProviderTester;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_supervisor() {
//!     let (tester, api) = ProviderTester::in_memory();
//!
//!     let state = tester.lifecycle_create("druid_kafka_supervisor", json!({
//!         "datasource": "orders",
//!         "topic": "orders-topic",
//!         "timestamp_spec": {"column": "ts"},
//!         "input_format": {"type": "json"},
//!         "consumer_properties": {"bootstrap.servers": "kafka:9092"}
//!     })).await.unwrap();
//!
//!     assert_eq!(state["state"], "RUNNING");
//!     assert_eq!(api.calls().len(), 3);
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::{SupervisorApi, SupervisorStatus};
use crate::error::ProviderError;
use crate::provider::DruidProvider;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::{ProviderService, TracedProvider};
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: TracedProvider<P>,
}

impl ProviderTester<DruidProvider> {
    /// A Druid provider wired to a fresh in-memory supervisor API.
    pub fn in_memory() -> (Self, Arc<InMemorySupervisorApi>) {
        let api = Arc::new(InMemorySupervisorApi::new());
        let provider = DruidProvider::with_api(api.clone());
        (Self::new(provider), api)
    }
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider: TracedProvider::new(provider),
        }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        self.provider.inner()
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Validate provider configuration, failing on error diagnostics.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Plan, create, then read. Returns the state after the read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Plan, update, then read. Returns the state after the read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// Plan a deletion, then delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }

    /// Create, update, then delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// A call received by [`InMemorySupervisorApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// `POST /supervisor` with this spec.
    Submit(Value),
    /// `GET /supervisor/{id}/status`.
    Status(String),
    /// `POST /supervisor/{id}/terminate`.
    Terminate(String),
    /// `POST /supervisor/{id}/suspend`.
    Suspend(String),
    /// `POST /supervisor/{id}/resume`.
    Resume(String),
}

#[derive(Debug, Clone)]
struct StoredSupervisor {
    spec: Value,
    state: String,
}

#[derive(Debug, Default)]
struct FakeState {
    supervisors: BTreeMap<String, StoredSupervisor>,
    calls: Vec<RecordedCall>,
    failure: Option<ProviderError>,
}

/// In-memory [`SupervisorApi`].
#[derive(Debug, Default)]
pub struct InMemorySupervisorApi {
    state: Mutex<FakeState>,
}

impl InMemorySupervisorApi {
    /// An empty overlord.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: ProviderError) {
        self.lock().failure = Some(err);
    }

    /// The last spec submitted for a supervisor.
    pub fn submitted_spec(&self, id: &str) -> Option<Value> {
        self.lock().supervisors.get(id).map(|s| s.spec.clone())
    }

    /// Current state of a supervisor.
    pub fn state_of(&self, id: &str) -> Option<String> {
        self.lock().supervisors.get(id).map(|s| s.state.clone())
    }

    /// Seed a supervisor created outside the provider.
    pub fn insert(&self, id: impl Into<String>, state: impl Into<String>) {
        self.lock().supervisors.insert(
            id.into(),
            StoredSupervisor {
                spec: Value::Null,
                state: state.into(),
            },
        );
    }

    /// Drop a supervisor as if it was terminated out of band.
    pub fn remove(&self, id: &str) {
        self.lock().supervisors.remove(id);
    }

    /// Record a call, honouring cancellation and any injected failure.
    fn begin(
        &self,
        call: RecordedCall,
        operation: &str,
        cancel: &CancellationToken,
    ) -> Result<MutexGuard<'_, FakeState>, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled(format!("{} cancelled", operation)));
        }
        let mut state = self.lock();
        state.calls.push(call);
        match state.failure.take() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    fn set_state(
        &self,
        id: &str,
        call: RecordedCall,
        operation: &str,
        new_state: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let mut state = self.begin(call, operation, cancel)?;
        match state.supervisors.get_mut(id) {
            Some(supervisor) => {
                supervisor.state = new_state.to_string();
                Ok(())
            },
            None => Err(ProviderError::api(404, format!("supervisor {} not found", id))),
        }
    }
}

#[async_trait]
impl SupervisorApi for InMemorySupervisorApi {
    async fn create_or_update(
        &self,
        spec: &Value,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let mut state = self.begin(RecordedCall::Submit(spec.clone()), "submit", cancel)?;
        let datasource = spec["spec"]["dataSchema"]["dataSource"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::api(400, "dataSource is required"))?;

        let id = format!("{}-supervisor", datasource);
        let supervisor_state = if spec["spec"]["suspended"] == Value::Bool(true) {
            "SUSPENDED"
        } else {
            "RUNNING"
        };
        state.supervisors.insert(
            id.clone(),
            StoredSupervisor {
                spec: spec.clone(),
                state: supervisor_state.to_string(),
            },
        );
        Ok(id)
    }

    async fn status(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SupervisorStatus>, ProviderError> {
        let state = self.begin(RecordedCall::Status(id.to_string()), "status", cancel)?;
        Ok(state.supervisors.get(id).map(|s| SupervisorStatus {
            id: id.to_string(),
            state: s.state.clone(),
        }))
    }

    async fn terminate(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        let mut state = self.begin(RecordedCall::Terminate(id.to_string()), "terminate", cancel)?;
        state.supervisors.remove(id);
        Ok(())
    }

    async fn suspend(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        self.set_state(id, RecordedCall::Suspend(id.to_string()), "suspend", "SUSPENDED", cancel)
    }

    async fn resume(&self, id: &str, cancel: &CancellationToken) -> Result<(), ProviderError> {
        self.set_state(id, RecordedCall::Resume(id.to_string()), "resume", "RUNNING", cancel)
    }
}

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute.
///
/// # Panics
///
/// Panics if the plan does not change the given attribute.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan leaves an attribute alone.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error whose summary contains `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::schema::RESOURCE_TYPE;
    use serde_json::json;

    fn config() -> Value {
        json!({
            "datasource": "orders",
            "topic": "orders-topic",
            "timestamp_spec": {"column": "ts"},
            "input_format": {"type": "json"},
            "consumer_properties": {"bootstrap.servers": "kafka:9092"}
        })
    }

    #[tokio::test]
    async fn test_tester_schema_and_types() {
        let (tester, _) = ProviderTester::in_memory();
        assert_eq!(tester.resource_types(), vec![RESOURCE_TYPE.to_string()]);
        assert!(tester.schema().provider.block.attributes.contains_key("endpoint"));
    }

    #[tokio::test]
    async fn test_tester_validate_resource_config() {
        let (tester, _) = ProviderTester::in_memory();
        tester
            .validate_resource_config(RESOURCE_TYPE, config())
            .await
            .unwrap();

        let mut invalid = config();
        invalid["consumer_properties"] = json!({});
        let err = tester
            .validate_resource_config(RESOURCE_TYPE, invalid)
            .await
            .unwrap_err();
        let TestError::Diagnostics(diagnostics) = err else {
            panic!("expected diagnostics");
        };
        assert_error_contains(&diagnostics, "bootstrap.servers");
    }

    #[tokio::test]
    async fn test_tester_configure_rejects_bad_endpoint() {
        let tester = ProviderTester::new(DruidProvider::new());
        let err = tester.configure(json!({"endpoint": "ftp://druid"})).await.unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[tokio::test]
    async fn test_tester_lifecycle_crud() {
        let (tester, api) = ProviderTester::in_memory();
        let mut updated = config();
        updated["suspended"] = json!(true);

        let state = tester
            .lifecycle_crud(RESOURCE_TYPE, config(), updated)
            .await
            .unwrap();
        assert_eq!(state["state"], "SUSPENDED");
        assert_eq!(state["id"], "orders-supervisor");
        assert_eq!(api.state_of("orders-supervisor"), None);
    }

    #[tokio::test]
    async fn test_tester_plan_helpers() {
        let (tester, _) = ProviderTester::in_memory();
        let plan = tester.plan_create(RESOURCE_TYPE, config()).await.unwrap();
        assert_plan_creates(&plan);

        let state = tester.create(RESOURCE_TYPE, plan.planned_state).await.unwrap();
        let plan = tester
            .plan_update(RESOURCE_TYPE, state.clone(), config())
            .await
            .unwrap();
        assert_plan_no_changes(&plan);

        let mut replaced = config();
        replaced["datasource"] = json!("payments");
        let plan = tester
            .plan_update(RESOURCE_TYPE, state.clone(), replaced)
            .await
            .unwrap();
        assert_plan_replaces(&plan);
        assert_plan_changes_attribute(&plan, "datasource");
        assert_plan_does_not_change_attribute(&plan, "topic");

        let mut scaled = config();
        scaled["replicas"] = json!(2);
        let plan = tester.plan_update(RESOURCE_TYPE, state.clone(), scaled).await.unwrap();
        assert_plan_updates_in_place(&plan);

        let plan = tester.plan_delete(RESOURCE_TYPE, state).await.unwrap();
        assert_plan_changes_attribute(&plan, "datasource");
    }

    #[tokio::test]
    async fn test_in_memory_api_failure_injection() {
        let api = InMemorySupervisorApi::new();
        let cancel = CancellationToken::new();
        api.insert("orders-supervisor", "RUNNING");
        api.fail_next(ProviderError::api(503, "overlord unavailable"));

        let err = api.status("orders-supervisor", &cancel).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        let status = api.status("orders-supervisor", &cancel).await.unwrap();
        assert_eq!(status.map(|s| s.state), Some("RUNNING".to_string()));
    }

    #[test]
    fn test_assert_no_errors() {
        assert_no_errors(&[Diagnostic::warning("Just a warning")]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("field1"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("field1"));
        assert!(display.contains("More info"));
    }
}

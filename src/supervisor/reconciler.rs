//! Lifecycle of one supervisor against the Druid control API.
//!
//! A [`TrackedSupervisor`] is the locally recorded identity and observed
//! state of a declared resource. It is either *absent* (no identity) or
//! *active* (identity set). A read that finds the supervisor gone clears
//! the identity so the next apply recreates it.
//!
//! Every operation mutates the tracked record only after the remote call
//! succeeded; a failed call leaves it untouched.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::ResourceConfig;
use super::spec::build_spec_value;
use crate::client::{SupervisorApi, SupervisorStatus};
use crate::error::ProviderError;

/// Locally tracked identity and observed state of a supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSupervisor {
    /// Identifier assigned by Druid; `None` while absent.
    pub id: Option<String>,
    /// Last observed lifecycle state, e.g. `RUNNING`.
    pub state: Option<String>,
}

/// Where a tracked supervisor sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No remote supervisor is known.
    Absent,
    /// A remote supervisor with a known identity exists.
    Active,
}

/// Result of reading a supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The supervisor exists; the tracked record mirrors this status.
    Present(SupervisorStatus),
    /// The supervisor no longer exists; the tracked identity was cleared.
    Gone,
}

impl TrackedSupervisor {
    /// A record with no remote counterpart.
    pub fn absent() -> Self {
        Self::default()
    }

    /// A record for a known supervisor id whose state has not been observed.
    pub fn active(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            state: None,
        }
    }

    /// Current lifecycle position.
    pub fn lifecycle(&self) -> Lifecycle {
        match self.id {
            Some(_) => Lifecycle::Active,
            None => Lifecycle::Absent,
        }
    }

    fn clear(&mut self) {
        self.id = None;
        self.state = None;
    }
}

/// Drives create, read, update, delete, suspend and resume calls.
#[derive(Debug, Clone)]
pub struct Reconciler<A> {
    api: A,
}

impl<A: SupervisorApi> Reconciler<A> {
    /// Create a reconciler over a supervisor API.
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// The underlying API.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Submit the supervisor and record the returned identity.
    pub async fn create(
        &self,
        tracked: &mut TrackedSupervisor,
        config: &ResourceConfig,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let spec = build_spec_value(config)?;
        debug!(datasource = %config.datasource, "Submitting supervisor");
        let id = self.api.create_or_update(&spec, cancel).await?;
        info!(datasource = %config.datasource, id = %id, "Supervisor created");
        tracked.id = Some(id);
        tracked.state = None;
        Ok(())
    }

    /// Refresh the observed state, clearing the identity if the supervisor is gone.
    pub async fn read(
        &self,
        tracked: &mut TrackedSupervisor,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome, ProviderError> {
        let Some(id) = tracked.id.as_deref() else {
            debug!("No supervisor identity to read");
            return Ok(ReadOutcome::Gone);
        };

        match self.api.status(id, cancel).await? {
            Some(status) => {
                debug!(id = %status.id, state = %status.state, "Supervisor observed");
                tracked.id = Some(status.id.clone());
                tracked.state = Some(status.state.clone());
                Ok(ReadOutcome::Present(status))
            },
            None => {
                warn!(id = %id, "Supervisor not found, removing from state");
                tracked.clear();
                Ok(ReadOutcome::Gone)
            },
        }
    }

    /// Resubmit the supervisor spec. The tracked identity never changes.
    pub async fn update(
        &self,
        tracked: &TrackedSupervisor,
        config: &ResourceConfig,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let id = require_id(tracked, "update")?;
        let spec = build_spec_value(config)?;
        debug!(id = %id, "Resubmitting supervisor");
        let returned = self.api.create_or_update(&spec, cancel).await?;
        if returned != id {
            warn!(id = %id, returned = %returned, "Druid returned a different supervisor id on update");
        }
        info!(id = %id, "Supervisor updated");
        Ok(())
    }

    /// Terminate the supervisor. A supervisor that is already gone counts as deleted.
    pub async fn delete(
        &self,
        tracked: &mut TrackedSupervisor,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let Some(id) = tracked.id.as_deref() else {
            debug!("No supervisor identity to delete");
            return Ok(());
        };
        self.api.terminate(id, cancel).await?;
        info!(id = %id, "Supervisor terminated");
        tracked.clear();
        Ok(())
    }

    /// Pause ingestion.
    pub async fn suspend(
        &self,
        tracked: &TrackedSupervisor,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let id = require_id(tracked, "suspend")?;
        self.api.suspend(id, cancel).await?;
        info!(id = %id, "Supervisor suspended");
        Ok(())
    }

    /// Resume ingestion.
    pub async fn resume(
        &self,
        tracked: &TrackedSupervisor,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let id = require_id(tracked, "resume")?;
        self.api.resume(id, cancel).await?;
        info!(id = %id, "Supervisor resumed");
        Ok(())
    }

    /// Suspend or resume to match the declared flag.
    pub async fn apply_suspended(
        &self,
        tracked: &TrackedSupervisor,
        suspended: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        if suspended {
            self.suspend(tracked, cancel).await
        } else {
            self.resume(tracked, cancel).await
        }
    }
}

fn require_id<'a>(tracked: &'a TrackedSupervisor, operation: &str) -> Result<&'a str, ProviderError> {
    tracked.id.as_deref().ok_or_else(|| {
        ProviderError::InvalidRequest(format!("cannot {} a supervisor without an id", operation))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemorySupervisorApi, RecordedCall};
    use serde_json::json;

    fn orders() -> ResourceConfig {
        ResourceConfig::new("orders", "orders-topic", "kafka:9092")
    }

    fn reconciler() -> Reconciler<InMemorySupervisorApi> {
        Reconciler::new(InMemorySupervisorApi::new())
    }

    #[tokio::test]
    async fn test_create_then_read_round_trip() {
        let reconciler = reconciler();
        let cancel = CancellationToken::new();
        let mut tracked = TrackedSupervisor::absent();
        assert_eq!(tracked.lifecycle(), Lifecycle::Absent);

        reconciler.create(&mut tracked, &orders(), &cancel).await.unwrap();
        assert_eq!(tracked.id.as_deref(), Some("orders-supervisor"));
        assert_eq!(tracked.lifecycle(), Lifecycle::Active);

        let outcome = reconciler.read(&mut tracked, &cancel).await.unwrap();
        assert_eq!(
            outcome,
            ReadOutcome::Present(SupervisorStatus {
                id: "orders-supervisor".to_string(),
                state: "RUNNING".to_string(),
            })
        );
        assert_eq!(tracked.state.as_deref(), Some("RUNNING"));
    }

    #[tokio::test]
    async fn test_create_submits_built_spec() {
        let reconciler = reconciler();
        let mut tracked = TrackedSupervisor::absent();
        reconciler
            .create(&mut tracked, &orders(), &CancellationToken::new())
            .await
            .unwrap();

        let calls = reconciler.api().calls();
        assert_eq!(calls.len(), 1);
        let RecordedCall::Submit(spec) = &calls[0] else {
            panic!("expected a submit, got {:?}", calls[0]);
        };
        assert_eq!(spec["spec"]["ioConfig"]["topic"], json!("orders-topic"));
    }

    #[tokio::test]
    async fn test_read_missing_supervisor_is_gone() {
        let reconciler = reconciler();
        let mut tracked = TrackedSupervisor::active("missing-id");
        tracked.state = Some("RUNNING".to_string());

        let outcome = reconciler.read(&mut tracked, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Gone);
        assert_eq!(tracked, TrackedSupervisor::absent());
    }

    #[tokio::test]
    async fn test_read_without_identity_skips_remote() {
        let reconciler = reconciler();
        let mut tracked = TrackedSupervisor::absent();
        let outcome = reconciler.read(&mut tracked, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Gone);
        assert!(reconciler.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_read_keeps_tracked_state() {
        let reconciler = reconciler();
        reconciler.api().fail_next(ProviderError::api(500, "boom"));
        let mut tracked = TrackedSupervisor::active("orders-supervisor");
        tracked.state = Some("RUNNING".to_string());
        let before = tracked.clone();

        let err = reconciler.read(&mut tracked, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(tracked, before);
    }

    #[tokio::test]
    async fn test_failed_create_records_nothing() {
        let reconciler = reconciler();
        reconciler.api().fail_next(ProviderError::api(400, "invalid spec"));
        let mut tracked = TrackedSupervisor::absent();

        let err = reconciler
            .create(&mut tracked, &orders(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid spec"));
        assert_eq!(tracked, TrackedSupervisor::absent());
    }

    #[tokio::test]
    async fn test_update_keeps_identity() {
        let reconciler = reconciler();
        let cancel = CancellationToken::new();
        let mut tracked = TrackedSupervisor::absent();
        reconciler.create(&mut tracked, &orders(), &cancel).await.unwrap();

        let mut changed = orders();
        changed.task_count = 4;
        reconciler.update(&tracked, &changed, &cancel).await.unwrap();
        assert_eq!(tracked.id.as_deref(), Some("orders-supervisor"));

        let submitted = reconciler.api().submitted_spec("orders-supervisor").unwrap();
        assert_eq!(submitted["spec"]["ioConfig"]["taskCount"], 4);
    }

    #[tokio::test]
    async fn test_update_requires_identity() {
        let err = reconciler()
            .update(&TrackedSupervisor::absent(), &orders(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let reconciler = reconciler();
        let cancel = CancellationToken::new();

        let mut tracked = TrackedSupervisor::active("never-existed");
        reconciler.delete(&mut tracked, &cancel).await.unwrap();
        assert_eq!(tracked.lifecycle(), Lifecycle::Absent);

        // Deleting an absent record makes no remote call.
        reconciler.delete(&mut tracked, &cancel).await.unwrap();
        assert_eq!(
            reconciler.api().calls(),
            vec![RecordedCall::Terminate("never-existed".to_string())]
        );
    }

    #[tokio::test]
    async fn test_suspend_and_resume_update_observed_state() {
        let reconciler = reconciler();
        let cancel = CancellationToken::new();
        let mut tracked = TrackedSupervisor::absent();
        reconciler.create(&mut tracked, &orders(), &cancel).await.unwrap();

        reconciler.apply_suspended(&tracked, true, &cancel).await.unwrap();
        reconciler.read(&mut tracked, &cancel).await.unwrap();
        assert_eq!(tracked.state.as_deref(), Some("SUSPENDED"));

        reconciler.apply_suspended(&tracked, false, &cancel).await.unwrap();
        reconciler.read(&mut tracked, &cancel).await.unwrap();
        assert_eq!(tracked.state.as_deref(), Some("RUNNING"));
    }

    #[tokio::test]
    async fn test_suspend_unknown_supervisor_fails() {
        let err = reconciler()
            .suspend(&TrackedSupervisor::active("ghost"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts() {
        let reconciler = reconciler();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut tracked = TrackedSupervisor::absent();

        let err = reconciler.create(&mut tracked, &orders(), &cancel).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
        assert_eq!(tracked, TrackedSupervisor::absent());
    }
}

//! The `druid_kafka_supervisor` resource.
//!
//! - [`model`]: typed desired state parsed from resource attributes
//! - [`schema`]: the declarative schema and its validation rules
//! - [`spec`]: translation into the supervisor document Druid accepts
//! - [`reconciler`]: the remote lifecycle

pub mod model;
pub mod reconciler;
pub mod schema;
pub mod spec;

pub use model::{ResourceConfig, TopicSelector};
pub use reconciler::{Lifecycle, ReadOutcome, Reconciler, TrackedSupervisor};
pub use schema::{resource_schema, RESOURCE_TYPE};
pub use spec::{build_spec, build_spec_value, SupervisorSpec};

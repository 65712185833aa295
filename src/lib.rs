//! Druid Provider
//!
//! A declarative-infrastructure provider that manages Apache Druid Kafka
//! ingestion supervisors through the Druid overlord's supervisor API.
//!
//! # Overview
//!
//! - **Resource model**: the `druid_kafka_supervisor` schema and its typed
//!   [`ResourceConfig`](supervisor::ResourceConfig)
//! - **Spec builder**: a pure translation of a config into the supervisor
//!   document Druid accepts
//! - **Reconciler**: create, read, update, delete, suspend and resume over a
//!   [`SupervisorApi`]
//! - **Client**: a `reqwest`-backed [`DruidClient`] honouring cancellation
//! - **ProviderService**: the engine-facing operations, implemented by
//!   [`DruidProvider`]
//! - **Logging**: integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use druid_provider::{DruidProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     druid_provider::init_logging();
//!
//!     let provider = DruidProvider::new();
//!     provider.configure(json!({"endpoint": "http://localhost:8888"})).await?;
//!
//!     let state = provider
//!         .create("druid_kafka_supervisor", json!({
//!             "datasource": "orders",
//!             "topic": "orders-topic",
//!             "timestamp_spec": {"column": "ts"},
//!             "input_format": {"type": "json"},
//!             "consumer_properties": {"bootstrap.servers": "kafka:9092"}
//!         }))
//!         .await?;
//!     println!("supervisor {} is {}", state["id"], state["state"]);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod schema;
pub mod service;
pub mod supervisor;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{DruidClient, SupervisorApi, SupervisorStatus};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::DruidProvider;
pub use schema::ProviderSchema;
pub use service::{ProviderService, TracedProvider};
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tokio_util::sync::CancellationToken;
pub use tracing;

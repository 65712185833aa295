//! Typed declarative configuration of a `druid_kafka_supervisor`.
//!
//! Field names are the snake_case attribute names users write. Optional
//! blocks are `Option`s, repeatable blocks are ordered `Vec`s, and schema
//! defaults are applied during deserialization so a parsed config is the
//! fully-defaulted desired state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// Default `timestamp_spec.format`.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "auto";
/// Default `dimensions_spec.dimensions[].type`.
pub const DEFAULT_DIMENSION_TYPE: &str = "string";
/// Default `granularity_spec.type`.
pub const DEFAULT_GRANULARITY_TYPE: &str = "uniform";
/// Default `granularity_spec.segment_granularity`.
pub const DEFAULT_SEGMENT_GRANULARITY: &str = "HOUR";
/// Default `granularity_spec.query_granularity`.
pub const DEFAULT_QUERY_GRANULARITY: &str = "NONE";
/// Default `task_count` and `replicas`.
pub const DEFAULT_TASK_COUNT: i64 = 1;
/// Default `task_duration`.
pub const DEFAULT_TASK_DURATION: &str = "PT1H";
/// Default `completion_timeout`.
pub const DEFAULT_COMPLETION_TIMEOUT: &str = "PT30M";
/// Default index compression for dimensions and metrics.
pub const DEFAULT_COMPRESSION: &str = "lz4";

/// Desired state of a Kafka ingestion supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Target datasource name.
    pub datasource: String,
    /// How the row timestamp is parsed.
    #[serde(default)]
    pub timestamp_spec: Option<TimestampSpec>,
    /// Dimension columns.
    #[serde(default)]
    pub dimensions_spec: Option<DimensionsSpec>,
    /// Aggregations, in declaration order.
    #[serde(default)]
    pub metrics_spec: Vec<MetricSpec>,
    /// Segment and query granularity.
    #[serde(default)]
    pub granularity_spec: Option<GranularitySpec>,
    /// Single Kafka topic. Mutually exclusive with `topic_pattern`.
    #[serde(default)]
    pub topic: Option<String>,
    /// Regex over Kafka topic names. Mutually exclusive with `topic`.
    #[serde(default)]
    pub topic_pattern: Option<String>,
    /// Input row format.
    #[serde(default)]
    pub input_format: Option<InputFormat>,
    /// Kafka consumer properties; must include `bootstrap.servers`.
    #[serde(default)]
    pub consumer_properties: BTreeMap<String, String>,
    /// Number of reading tasks.
    #[serde(default = "default_task_count")]
    pub task_count: i64,
    /// Number of replica tasks.
    #[serde(default = "default_task_count")]
    pub replicas: i64,
    /// ISO 8601 task duration.
    #[serde(default = "default_task_duration")]
    pub task_duration: String,
    /// Start new partitions from the earliest offset.
    #[serde(default)]
    pub use_earliest_offset: bool,
    /// ISO 8601 task completion timeout.
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout: String,
    /// Idle detection.
    #[serde(default)]
    pub idle_config: Option<IdleConfig>,
    /// Tuning knobs; the whole block is omitted when absent.
    #[serde(default)]
    pub tuning_config: Option<TuningConfig>,
    /// Query context parameters.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Whether the supervisor should be suspended.
    #[serde(default)]
    pub suspended: bool,
}

/// `timestamp_spec` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampSpec {
    /// Timestamp column.
    pub column: String,
    /// Timestamp format (`auto`, `iso`, `millis`, ...).
    #[serde(default = "default_timestamp_format")]
    pub format: String,
    /// Timestamp used for rows without one.
    #[serde(default)]
    pub missing_value: Option<String>,
}

/// `dimensions_spec` block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionsSpec {
    /// Dimensions, in declaration order.
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    /// Columns excluded from dimension discovery.
    #[serde(default)]
    pub dimension_exclusions: BTreeSet<String>,
    /// Spatial dimensions, in declaration order.
    #[serde(default)]
    pub spatial_dimensions: Vec<SpatialDimension>,
}

/// One entry of `dimensions_spec.dimensions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Column name.
    pub name: String,
    /// Column type (`string`, `long`, `float`, `double`).
    #[serde(rename = "type", default = "default_dimension_type")]
    pub dimension_type: String,
    /// Multi-value handling mode.
    #[serde(default)]
    pub multi_value_handling: Option<String>,
}

/// One entry of `dimensions_spec.spatial_dimensions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialDimension {
    /// Name of the spatial dimension.
    pub dim_name: String,
    /// Coordinate columns.
    #[serde(default)]
    pub dims: Vec<String>,
}

/// One entry of `metrics_spec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Output metric name.
    pub name: String,
    /// Aggregator type (`count`, `longSum`, `doubleSum`, ...).
    #[serde(rename = "type")]
    pub metric_type: String,
    /// Input column.
    #[serde(default)]
    pub field_name: Option<String>,
}

/// `granularity_spec` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranularitySpec {
    /// Granularity spec type.
    #[serde(rename = "type", default = "default_granularity_type")]
    pub granularity_type: String,
    /// Segment granularity.
    #[serde(default = "default_segment_granularity")]
    pub segment_granularity: String,
    /// Query granularity.
    #[serde(default = "default_query_granularity")]
    pub query_granularity: String,
    /// Whether rollup is enabled.
    #[serde(default = "default_true")]
    pub rollup: bool,
}

impl Default for GranularitySpec {
    fn default() -> Self {
        Self {
            granularity_type: default_granularity_type(),
            segment_granularity: default_segment_granularity(),
            query_granularity: default_query_granularity(),
            rollup: true,
        }
    }
}

/// `input_format` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFormat {
    /// Format type (`json`, `csv`, `tsv`, ...).
    #[serde(rename = "type")]
    pub format_type: String,
    /// Settings for delimited formats.
    #[serde(default)]
    pub flat_spec: Option<FlatSpec>,
}

/// `input_format.flat_spec` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatSpec {
    /// Discover fields from the header or data.
    #[serde(default = "default_true")]
    pub use_field_discovery: bool,
    /// Field delimiter.
    #[serde(default)]
    pub delimiter: Option<String>,
    /// Column names, in order.
    #[serde(default)]
    pub columns: Vec<String>,
}

/// `idle_config` block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Whether idle detection is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Milliseconds of inactivity before the supervisor goes idle.
    #[serde(default)]
    pub inactive_after_millis: Option<i64>,
}

/// `tuning_config` block. Every knob is independently optional.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub max_rows_per_segment: Option<i64>,
    #[serde(default)]
    pub max_rows_in_memory: Option<i64>,
    #[serde(default)]
    pub max_bytes_in_memory: Option<i64>,
    #[serde(default)]
    pub skip_bytes_in_memory_overhead_check: Option<bool>,
    #[serde(default)]
    pub max_pending_persists: Option<i64>,
    #[serde(default)]
    pub intermediate_persist_period: Option<String>,
    #[serde(default)]
    pub max_parse_exceptions: Option<i64>,
    #[serde(default)]
    pub max_saved_parse_exceptions: Option<i64>,
    #[serde(default)]
    pub log_parse_exceptions: Option<bool>,
    #[serde(default)]
    pub reset_offset_automatically: Option<bool>,
    #[serde(default)]
    pub worker_threads: Option<i64>,
    #[serde(default)]
    pub chat_threads: Option<i64>,
    #[serde(default)]
    pub chat_retries: Option<i64>,
    #[serde(default)]
    pub http_timeout: Option<String>,
    #[serde(default)]
    pub shutdown_timeout: Option<String>,
    #[serde(default)]
    pub segment_write_out_medium_factory: BTreeMap<String, String>,
    #[serde(default)]
    pub index_spec: Option<IndexSpec>,
}

/// `tuning_config.index_spec` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Bitmap index settings, e.g. `{type = "roaring"}`.
    #[serde(default)]
    pub bitmap: BTreeMap<String, String>,
    /// Dimension column compression.
    #[serde(default = "default_compression")]
    pub dimension_compression: String,
    /// Metric column compression.
    #[serde(default = "default_compression")]
    pub metric_compression: String,
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self {
            bitmap: BTreeMap::new(),
            dimension_compression: default_compression(),
            metric_compression: default_compression(),
        }
    }
}

/// Which Kafka topics the supervisor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicSelector<'a> {
    /// A single named topic.
    Topic(&'a str),
    /// Every topic matching a regex.
    Pattern(&'a str),
}

impl ResourceConfig {
    /// Minimal configuration for a datasource reading one topic.
    pub fn new(
        datasource: impl Into<String>,
        topic: impl Into<String>,
        bootstrap_servers: impl Into<String>,
    ) -> Self {
        let mut consumer_properties = BTreeMap::new();
        consumer_properties.insert("bootstrap.servers".to_string(), bootstrap_servers.into());
        Self {
            datasource: datasource.into(),
            timestamp_spec: None,
            dimensions_spec: None,
            metrics_spec: Vec::new(),
            granularity_spec: None,
            topic: Some(topic.into()),
            topic_pattern: None,
            input_format: None,
            consumer_properties,
            task_count: DEFAULT_TASK_COUNT,
            replicas: DEFAULT_TASK_COUNT,
            task_duration: default_task_duration(),
            use_earliest_offset: false,
            completion_timeout: default_completion_timeout(),
            idle_config: None,
            tuning_config: None,
            context: BTreeMap::new(),
            suspended: false,
        }
    }

    /// Parse a resource state or config object.
    ///
    /// Null attributes are treated as unset so that schema defaults apply,
    /// and unknown keys (such as the computed `id` and `state`) are ignored.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        let mut value = value.clone();
        strip_nulls(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    /// Render the configuration back into a state object with defaults filled.
    pub fn to_value(&self) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }

    /// The configured topic selection; an empty string counts as unset.
    pub fn topic_selector(&self) -> Option<TopicSelector<'_>> {
        non_empty(&self.topic)
            .map(TopicSelector::Topic)
            .or_else(|| non_empty(&self.topic_pattern).map(TopicSelector::Pattern))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        },
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {},
    }
}

fn default_true() -> bool {
    true
}

fn default_task_count() -> i64 {
    DEFAULT_TASK_COUNT
}

fn default_task_duration() -> String {
    DEFAULT_TASK_DURATION.to_string()
}

fn default_completion_timeout() -> String {
    DEFAULT_COMPLETION_TIMEOUT.to_string()
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

fn default_dimension_type() -> String {
    DEFAULT_DIMENSION_TYPE.to_string()
}

fn default_granularity_type() -> String {
    DEFAULT_GRANULARITY_TYPE.to_string()
}

fn default_segment_granularity() -> String {
    DEFAULT_SEGMENT_GRANULARITY.to_string()
}

fn default_query_granularity() -> String {
    DEFAULT_QUERY_GRANULARITY.to_string()
}

fn default_compression() -> String {
    DEFAULT_COMPRESSION.to_string()
}

//! Translation of a [`ResourceConfig`] into the supervisor spec Druid accepts.
//!
//! The wire document is a tree of borrowed structs serialized with camelCase
//! keys. Optional values that are unset, empty, zero or `false` are left out
//! of the document so Druid applies its own defaults. The five core `ioConfig`
//! fields (`taskCount`, `replicas`, `taskDuration`, `useEarliestOffset`,
//! `completionTimeout`) are always present.
//!
//! Building is pure: the same config always serializes to the same bytes.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};

use super::model::{
    Dimension, DimensionsSpec, FlatSpec, GranularitySpec, IdleConfig, IndexSpec, InputFormat,
    MetricSpec, ResourceConfig, SpatialDimension, TimestampSpec, TopicSelector, TuningConfig,
};
use crate::client::SupervisorStatus;
use crate::error::ProviderError;

/// Supervisor type sent in the top-level `type` and in `tuningConfig.type`.
pub const SUPERVISOR_TYPE: &str = "kafka";

/// Top-level supervisor document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorSpec<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    spec: IngestionSpec<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestionSpec<'a> {
    data_schema: DataSchema<'a>,
    io_config: IoConfig<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tuning_config: Option<WireTuningConfig<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suspended: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataSchema<'a> {
    data_source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp_spec: Option<WireTimestampSpec<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions_spec: Option<WireDimensionsSpec<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    metrics_spec: Vec<WireMetric<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    granularity_spec: Option<WireGranularitySpec<'a>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTimestampSpec<'a> {
    column: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_value: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDimensionsSpec<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimensions: Vec<WireDimension<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_exclusions: Option<&'a BTreeSet<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    spatial_dimensions: Vec<WireSpatialDimension<'a>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDimension<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    multi_value_handling: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSpatialDimension<'a> {
    dim_name: &'a str,
    dims: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMetric<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_name: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGranularitySpec<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    segment_granularity: &'a str,
    query_granularity: &'a str,
    rollup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct IoConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic_pattern: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_format: Option<WireInputFormat<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    consumer_properties: Option<&'a BTreeMap<String, String>>,
    task_count: i64,
    replicas: i64,
    task_duration: &'a str,
    use_earliest_offset: bool,
    completion_timeout: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    idle_config: Option<WireIdleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInputFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    flat_spec: Option<WireFlatSpec<'a>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireFlatSpec<'a> {
    use_field_discovery: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    delimiter: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<&'a [String]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireIdleConfig {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    inactive_after_millis: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTuningConfig<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_rows_per_segment: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_rows_in_memory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_bytes_in_memory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_bytes_in_memory_overhead_check: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_pending_persists: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    intermediate_persist_period: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_parse_exceptions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_saved_parse_exceptions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_parse_exceptions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_offset_automatically: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker_threads: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_threads: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_retries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_timeout: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shutdown_timeout: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_spec: Option<WireIndexSpec<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    segment_write_out_medium_factory: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireIndexSpec<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    bitmap: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_compression: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metric_compression: Option<&'a str>,
}

fn text(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn non_empty_str(value: &str) -> Option<&str> {
    Some(value).filter(|s| !s.is_empty())
}

fn positive(value: Option<i64>) -> Option<i64> {
    value.filter(|n| *n > 0)
}

fn enabled(value: Option<bool>) -> Option<bool> {
    value.filter(|b| *b)
}

fn non_empty_map(map: &BTreeMap<String, String>) -> Option<&BTreeMap<String, String>> {
    Some(map).filter(|m| !m.is_empty())
}

/// Build the supervisor document for a validated configuration.
pub fn build_spec(config: &ResourceConfig) -> SupervisorSpec<'_> {
    let (topic, topic_pattern) = match config.topic_selector() {
        Some(TopicSelector::Topic(topic)) => (Some(topic), None),
        Some(TopicSelector::Pattern(pattern)) => (None, Some(pattern)),
        None => (None, None),
    };

    SupervisorSpec {
        kind: SUPERVISOR_TYPE,
        spec: IngestionSpec {
            data_schema: DataSchema {
                data_source: &config.datasource,
                timestamp_spec: config.timestamp_spec.as_ref().map(timestamp_spec),
                dimensions_spec: config.dimensions_spec.as_ref().and_then(dimensions_spec),
                metrics_spec: config.metrics_spec.iter().map(metric).collect(),
                granularity_spec: config.granularity_spec.as_ref().map(granularity_spec),
            },
            io_config: IoConfig {
                topic,
                topic_pattern,
                input_format: config.input_format.as_ref().map(input_format),
                consumer_properties: non_empty_map(&config.consumer_properties),
                task_count: config.task_count,
                replicas: config.replicas,
                task_duration: &config.task_duration,
                use_earliest_offset: config.use_earliest_offset,
                completion_timeout: &config.completion_timeout,
                idle_config: config.idle_config.as_ref().map(idle_config),
            },
            tuning_config: config.tuning_config.as_ref().map(tuning_config),
            context: non_empty_map(&config.context),
            suspended: Some(config.suspended).filter(|s| *s),
        },
    }
}

/// Build the supervisor document as a JSON value.
pub fn build_spec_value(config: &ResourceConfig) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(build_spec(config))?)
}

fn timestamp_spec(spec: &TimestampSpec) -> WireTimestampSpec<'_> {
    WireTimestampSpec {
        column: &spec.column,
        format: &spec.format,
        missing_value: text(&spec.missing_value),
    }
}

fn dimensions_spec(spec: &DimensionsSpec) -> Option<WireDimensionsSpec<'_>> {
    let wire = WireDimensionsSpec {
        dimensions: spec.dimensions.iter().map(dimension).collect(),
        dimension_exclusions: Some(&spec.dimension_exclusions).filter(|s| !s.is_empty()),
        spatial_dimensions: spec.spatial_dimensions.iter().map(spatial_dimension).collect(),
    };
    let empty = wire.dimensions.is_empty()
        && wire.dimension_exclusions.is_none()
        && wire.spatial_dimensions.is_empty();
    (!empty).then_some(wire)
}

fn dimension(dimension: &Dimension) -> WireDimension<'_> {
    WireDimension {
        name: &dimension.name,
        kind: &dimension.dimension_type,
        multi_value_handling: text(&dimension.multi_value_handling),
    }
}

fn spatial_dimension(dimension: &SpatialDimension) -> WireSpatialDimension<'_> {
    WireSpatialDimension {
        dim_name: &dimension.dim_name,
        dims: &dimension.dims,
    }
}

fn metric(metric: &MetricSpec) -> WireMetric<'_> {
    WireMetric {
        name: &metric.name,
        kind: &metric.metric_type,
        field_name: text(&metric.field_name),
    }
}

fn granularity_spec(spec: &GranularitySpec) -> WireGranularitySpec<'_> {
    WireGranularitySpec {
        kind: &spec.granularity_type,
        segment_granularity: &spec.segment_granularity,
        query_granularity: &spec.query_granularity,
        rollup: spec.rollup,
    }
}

fn input_format(format: &InputFormat) -> WireInputFormat<'_> {
    WireInputFormat {
        kind: &format.format_type,
        flat_spec: format.flat_spec.as_ref().map(flat_spec),
    }
}

fn flat_spec(spec: &FlatSpec) -> WireFlatSpec<'_> {
    WireFlatSpec {
        use_field_discovery: spec.use_field_discovery,
        delimiter: text(&spec.delimiter),
        columns: Some(spec.columns.as_slice()).filter(|c| !c.is_empty()),
    }
}

fn idle_config(config: &IdleConfig) -> WireIdleConfig {
    WireIdleConfig {
        enabled: config.enabled,
        inactive_after_millis: positive(config.inactive_after_millis),
    }
}

fn tuning_config(config: &TuningConfig) -> WireTuningConfig<'_> {
    WireTuningConfig {
        kind: SUPERVISOR_TYPE,
        max_rows_per_segment: positive(config.max_rows_per_segment),
        max_rows_in_memory: positive(config.max_rows_in_memory),
        max_bytes_in_memory: positive(config.max_bytes_in_memory),
        skip_bytes_in_memory_overhead_check: enabled(config.skip_bytes_in_memory_overhead_check),
        max_pending_persists: positive(config.max_pending_persists),
        intermediate_persist_period: text(&config.intermediate_persist_period),
        max_parse_exceptions: positive(config.max_parse_exceptions),
        max_saved_parse_exceptions: positive(config.max_saved_parse_exceptions),
        log_parse_exceptions: enabled(config.log_parse_exceptions),
        reset_offset_automatically: enabled(config.reset_offset_automatically),
        worker_threads: positive(config.worker_threads),
        chat_threads: positive(config.chat_threads),
        chat_retries: positive(config.chat_retries),
        http_timeout: text(&config.http_timeout),
        shutdown_timeout: text(&config.shutdown_timeout),
        index_spec: config.index_spec.as_ref().and_then(index_spec),
        segment_write_out_medium_factory: non_empty_map(&config.segment_write_out_medium_factory),
    }
}

fn index_spec(spec: &IndexSpec) -> Option<WireIndexSpec<'_>> {
    let wire = WireIndexSpec {
        bitmap: non_empty_map(&spec.bitmap),
        dimension_compression: non_empty_str(&spec.dimension_compression),
        metric_compression: non_empty_str(&spec.metric_compression),
    };
    let empty = wire.bitmap.is_none()
        && wire.dimension_compression.is_none()
        && wire.metric_compression.is_none();
    (!empty).then_some(wire)
}

/// Computed attributes derived from an observed supervisor.
///
/// `id` and `supervisor_id` both carry the server-assigned identifier and
/// `state` the reported lifecycle state.
pub fn observed_attributes(status: &SupervisorStatus) -> Map<String, Value> {
    let mut attributes = Map::new();
    attributes.insert("id".to_string(), Value::String(status.id.clone()));
    attributes.insert("supervisor_id".to_string(), Value::String(status.id.clone()));
    attributes.insert("state".to_string(), Value::String(status.state.clone()));
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> ResourceConfig {
        ResourceConfig::new("orders", "orders-topic", "kafka:9092")
    }

    fn build(config: &ResourceConfig) -> Value {
        build_spec_value(config).unwrap()
    }

    #[test]
    fn test_minimal_spec_body() {
        let body = serde_json::to_string(&build_spec(&orders())).unwrap();
        assert_eq!(
            body,
            r#"{"type":"kafka","spec":{"dataSchema":{"dataSource":"orders"},"ioConfig":{"topic":"orders-topic","consumerProperties":{"bootstrap.servers":"kafka:9092"},"taskCount":1,"replicas":1,"taskDuration":"PT1H","useEarliestOffset":false,"completionTimeout":"PT30M"}}}"#
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut config = orders();
        config.context.insert("priority".to_string(), "100".to_string());
        config.context.insert("lookupTier".to_string(), "hot".to_string());
        config
            .consumer_properties
            .insert("security.protocol".to_string(), "SASL_SSL".to_string());

        let first = serde_json::to_string(&build_spec(&config)).unwrap();
        let second = serde_json::to_string(&build_spec(&config.clone())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_basic_spec() {
        let config = ResourceConfig::from_value(&json!({
            "datasource": "test-datasource",
            "topic": "test-topic",
            "timestamp_spec": {"column": "timestamp", "format": "iso"},
            "input_format": {"type": "json"},
            "consumer_properties": {"bootstrap.servers": "localhost:9092"},
            "task_count": 2,
            "replicas": 1,
            "task_duration": "PT1H",
            "use_earliest_offset": true,
            "completion_timeout": "PT30M",
            "suspended": false
        }))
        .unwrap();

        let spec = build(&config);
        assert_eq!(spec["type"], "kafka");
        assert_eq!(spec["spec"]["dataSchema"]["dataSource"], "test-datasource");
        assert_eq!(
            spec["spec"]["dataSchema"]["timestampSpec"],
            json!({"column": "timestamp", "format": "iso"})
        );

        let io = &spec["spec"]["ioConfig"];
        assert_eq!(io["topic"], "test-topic");
        assert!(io.get("topicPattern").is_none());
        assert_eq!(io["inputFormat"], json!({"type": "json"}));
        assert_eq!(io["taskCount"], 2);
        assert_eq!(io["useEarliestOffset"], true);
        assert!(spec["spec"].get("suspended").is_none());
    }

    #[test]
    fn test_advanced_spec() {
        let config = ResourceConfig::from_value(&json!({
            "datasource": "advanced-datasource",
            "topic_pattern": "metrics-.*",
            "timestamp_spec": {"column": "ts", "format": "millis", "missing_value": "2020-01-01T00:00:00Z"},
            "dimensions_spec": {
                "dimensions": [
                    {"name": "user_id", "type": "string"},
                    {"name": "tags", "type": "string", "multi_value_handling": "SORTED_ARRAY"},
                    {"name": "count", "type": "long"}
                ],
                "dimension_exclusions": ["internal_field"]
            },
            "metrics_spec": [
                {"name": "count", "type": "count"},
                {"name": "total_value", "type": "doubleSum", "field_name": "value"}
            ],
            "granularity_spec": {
                "type": "uniform",
                "segment_granularity": "DAY",
                "query_granularity": "HOUR",
                "rollup": false
            },
            "input_format": {"type": "csv", "flat_spec": {"delimiter": ",", "columns": ["ts", "user_id", "value"]}},
            "consumer_properties": {"bootstrap.servers": "kafka:9092", "group.id": "druid"},
            "context": {"priority": "100"},
            "suspended": true
        }))
        .unwrap();

        let spec = build(&config);
        let data_schema = &spec["spec"]["dataSchema"];
        assert_eq!(data_schema["timestampSpec"]["missingValue"], "2020-01-01T00:00:00Z");
        assert_eq!(
            data_schema["dimensionsSpec"],
            json!({
                "dimensions": [
                    {"name": "user_id", "type": "string"},
                    {"name": "tags", "type": "string", "multiValueHandling": "SORTED_ARRAY"},
                    {"name": "count", "type": "long"}
                ],
                "dimensionExclusions": ["internal_field"]
            })
        );
        assert_eq!(
            data_schema["metricsSpec"],
            json!([
                {"name": "count", "type": "count"},
                {"name": "total_value", "type": "doubleSum", "fieldName": "value"}
            ])
        );
        assert_eq!(
            data_schema["granularitySpec"],
            json!({"type": "uniform", "segmentGranularity": "DAY", "queryGranularity": "HOUR", "rollup": false})
        );

        let io = &spec["spec"]["ioConfig"];
        assert!(io.get("topic").is_none());
        assert_eq!(io["topicPattern"], "metrics-.*");
        assert_eq!(
            io["inputFormat"],
            json!({"type": "csv", "flatSpec": {"useFieldDiscovery": true, "delimiter": ",", "columns": ["ts", "user_id", "value"]}})
        );
        assert_eq!(spec["spec"]["context"], json!({"priority": "100"}));
        assert_eq!(spec["spec"]["suspended"], true);
    }

    #[test]
    fn test_declaration_order_preserved() {
        let config = ResourceConfig::from_value(&json!({
            "datasource": "orders",
            "topic": "orders-topic",
            "metrics_spec": [
                {"name": "z", "type": "count"},
                {"name": "a", "type": "longSum", "field_name": "amount"},
                {"name": "m", "type": "doubleMax", "field_name": "price"}
            ],
            "dimensions_spec": {
                "spatial_dimensions": [{"dim_name": "location", "dims": ["lon", "lat"]}]
            }
        }))
        .unwrap();

        let spec = build(&config);
        let names: Vec<_> = spec["spec"]["dataSchema"]["metricsSpec"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["z", "a", "m"]);
        assert_eq!(
            spec["spec"]["dataSchema"]["dimensionsSpec"],
            json!({"spatialDimensions": [{"dimName": "location", "dims": ["lon", "lat"]}]})
        );
    }

    #[test]
    fn test_zero_valued_tuning_knobs_suppressed() {
        // Every knob set to its zero value, explicitly.
        let mut config = orders();
        config.tuning_config = Some(TuningConfig {
            max_rows_per_segment: Some(0),
            max_rows_in_memory: Some(0),
            max_bytes_in_memory: Some(0),
            skip_bytes_in_memory_overhead_check: Some(false),
            max_pending_persists: Some(0),
            intermediate_persist_period: Some(String::new()),
            max_parse_exceptions: Some(0),
            max_saved_parse_exceptions: Some(0),
            log_parse_exceptions: Some(false),
            reset_offset_automatically: Some(false),
            worker_threads: Some(0),
            chat_threads: Some(0),
            chat_retries: Some(0),
            http_timeout: Some(String::new()),
            shutdown_timeout: Some(String::new()),
            segment_write_out_medium_factory: BTreeMap::new(),
            index_spec: Some(IndexSpec {
                bitmap: BTreeMap::new(),
                dimension_compression: String::new(),
                metric_compression: String::new(),
            }),
        });

        let spec = build(&config);
        assert_eq!(spec["spec"]["tuningConfig"], json!({"type": "kafka"}));
    }

    #[test]
    fn test_tuning_knobs_emitted_when_set() {
        let mut config = orders();
        let mut tuning = TuningConfig {
            max_rows_per_segment: Some(5_000_000),
            max_bytes_in_memory: Some(-1),
            log_parse_exceptions: Some(true),
            chat_retries: Some(8),
            http_timeout: Some("PT10S".to_string()),
            index_spec: Some(IndexSpec::default()),
            ..Default::default()
        };
        tuning
            .segment_write_out_medium_factory
            .insert("type".to_string(), "offHeapMemory".to_string());
        config.tuning_config = Some(tuning);

        let spec = build(&config);
        assert_eq!(
            spec["spec"]["tuningConfig"],
            json!({
                "type": "kafka",
                "maxRowsPerSegment": 5_000_000,
                "logParseExceptions": true,
                "chatRetries": 8,
                "httpTimeout": "PT10S",
                "indexSpec": {"dimensionCompression": "lz4", "metricCompression": "lz4"},
                "segmentWriteOutMediumFactory": {"type": "offHeapMemory"}
            })
        );
    }

    #[test]
    fn test_empty_optional_values_suppressed() {
        let mut config = orders();
        config.topic_pattern = Some(String::new());
        config.dimensions_spec = Some(DimensionsSpec::default());
        config.timestamp_spec = Some(TimestampSpec {
            column: "ts".to_string(),
            format: "auto".to_string(),
            missing_value: Some(String::new()),
        });
        config.idle_config = Some(IdleConfig {
            enabled: false,
            inactive_after_millis: Some(0),
        });

        let spec = build(&config);
        let data_schema = spec["spec"]["dataSchema"].as_object().unwrap();
        assert!(!data_schema.contains_key("dimensionsSpec"));
        assert!(!data_schema.contains_key("metricsSpec"));
        assert_eq!(data_schema["timestampSpec"], json!({"column": "ts", "format": "auto"}));

        let io = spec["spec"]["ioConfig"].as_object().unwrap();
        assert!(!io.contains_key("topicPattern"));
        assert_eq!(io["idleConfig"], json!({"enabled": false}));
        assert!(!spec["spec"].as_object().unwrap().contains_key("context"));
    }

    #[test]
    fn test_empty_nested_values_suppressed() {
        let mut config = orders();
        config.dimensions_spec = Some(DimensionsSpec {
            dimensions: vec![Dimension {
                name: "country".to_string(),
                dimension_type: "string".to_string(),
                multi_value_handling: Some(String::new()),
            }],
            spatial_dimensions: Vec::new(),
            ..Default::default()
        });
        config.metrics_spec = vec![MetricSpec {
            name: "count".to_string(),
            metric_type: "count".to_string(),
            field_name: Some(String::new()),
        }];
        config.input_format = Some(InputFormat {
            format_type: "csv".to_string(),
            flat_spec: Some(FlatSpec {
                use_field_discovery: false,
                delimiter: Some(String::new()),
                columns: Vec::new(),
            }),
        });
        config.tuning_config = Some(TuningConfig {
            index_spec: Some(IndexSpec {
                bitmap: BTreeMap::new(),
                ..Default::default()
            }),
            ..Default::default()
        });

        let spec = build(&config);
        let data_schema = &spec["spec"]["dataSchema"];
        assert_eq!(
            data_schema["dimensionsSpec"],
            json!({"dimensions": [{"name": "country", "type": "string"}]})
        );
        assert_eq!(data_schema["metricsSpec"], json!([{"name": "count", "type": "count"}]));
        assert_eq!(
            spec["spec"]["ioConfig"]["inputFormat"],
            json!({"type": "csv", "flatSpec": {"useFieldDiscovery": false}})
        );
        assert_eq!(
            spec["spec"]["tuningConfig"]["indexSpec"],
            json!({"dimensionCompression": "lz4", "metricCompression": "lz4"})
        );
    }

    #[test]
    fn test_core_io_fields_always_present() {
        let mut config = orders();
        config.consumer_properties.clear();
        config.topic = None;

        let io = build(&config)["spec"]["ioConfig"].clone();
        assert_eq!(
            io,
            json!({
                "taskCount": 1,
                "replicas": 1,
                "taskDuration": "PT1H",
                "useEarliestOffset": false,
                "completionTimeout": "PT30M"
            })
        );
    }

    #[test]
    fn test_idle_config_with_threshold() {
        let mut config = orders();
        config.idle_config = Some(IdleConfig {
            enabled: true,
            inactive_after_millis: Some(600_000),
        });
        assert_eq!(
            build(&config)["spec"]["ioConfig"]["idleConfig"],
            json!({"enabled": true, "inactiveAfterMillis": 600_000})
        );
    }

    #[test]
    fn test_observed_attributes() {
        let status = SupervisorStatus {
            id: "orders-supervisor".to_string(),
            state: "RUNNING".to_string(),
        };
        let attributes = observed_attributes(&status);
        assert_eq!(attributes["id"], "orders-supervisor");
        assert_eq!(attributes["supervisor_id"], "orders-supervisor");
        assert_eq!(attributes["state"], "RUNNING");
    }
}

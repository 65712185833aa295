//! Declarative schema of the `druid_kafka_supervisor` resource.

use serde_json::Value;

use super::model::{
    DEFAULT_COMPLETION_TIMEOUT, DEFAULT_COMPRESSION, DEFAULT_DIMENSION_TYPE,
    DEFAULT_GRANULARITY_TYPE, DEFAULT_QUERY_GRANULARITY, DEFAULT_SEGMENT_GRANULARITY,
    DEFAULT_TASK_COUNT, DEFAULT_TASK_DURATION, DEFAULT_TIMESTAMP_FORMAT,
};
use crate::schema::{Attribute, Block, NestedBlock, Schema};

/// Resource type name.
pub const RESOURCE_TYPE: &str = "druid_kafka_supervisor";

/// Consumer property every supervisor must carry.
pub const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";

const TOPIC_GROUP: [&str; 2] = ["topic", "topic_pattern"];

/// Schema of a Kafka ingestion supervisor.
pub fn resource_schema() -> Schema {
    Schema::v0()
        .with_description("Manages an Apache Druid Kafka ingestion supervisor")
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("Supervisor identifier"),
        )
        .with_attribute(
            "supervisor_id",
            Attribute::computed_string().with_description("Supervisor ID returned by Druid"),
        )
        .with_attribute(
            "state",
            Attribute::computed_string()
                .with_description("Current state of the supervisor (RUNNING, SUSPENDED, ...)"),
        )
        .with_attribute(
            "datasource",
            Attribute::required_string()
                .with_force_new()
                .with_description("Name of the Druid datasource to ingest into"),
        )
        .with_attribute(
            "topic",
            Attribute::optional_string()
                .with_exactly_one_of(TOPIC_GROUP)
                .with_description("Kafka topic to consume from"),
        )
        .with_attribute(
            "topic_pattern",
            Attribute::optional_string()
                .with_exactly_one_of(TOPIC_GROUP)
                .with_description("Regex pattern matching the Kafka topics to consume from"),
        )
        .with_attribute(
            "consumer_properties",
            Attribute::required_string_map()
                .with_required_key(BOOTSTRAP_SERVERS)
                .with_description("Kafka consumer properties; must include bootstrap.servers"),
        )
        .with_attribute(
            "task_count",
            Attribute::optional_int64()
                .with_min_value(1)
                .with_default(Value::from(DEFAULT_TASK_COUNT))
                .with_description("Maximum number of reading tasks"),
        )
        .with_attribute(
            "replicas",
            Attribute::optional_int64()
                .with_min_value(1)
                .with_default(Value::from(DEFAULT_TASK_COUNT))
                .with_description("Number of replica sets"),
        )
        .with_attribute(
            "task_duration",
            Attribute::optional_string()
                .with_default(Value::from(DEFAULT_TASK_DURATION))
                .with_description("Length of time before tasks stop reading and begin publishing"),
        )
        .with_attribute(
            "use_earliest_offset",
            Attribute::optional_bool()
                .with_default(Value::Bool(false))
                .with_description("Read from the earliest offset when no stored offset exists"),
        )
        .with_attribute(
            "completion_timeout",
            Attribute::optional_string()
                .with_default(Value::from(DEFAULT_COMPLETION_TIMEOUT))
                .with_description("Time to wait for a publishing task to finish"),
        )
        .with_attribute(
            "context",
            Attribute::optional_string_map().with_description("Context parameters for the supervisor"),
        )
        .with_attribute(
            "suspended",
            Attribute::optional_bool()
                .with_default(Value::Bool(false))
                .with_description("Whether the supervisor should be suspended"),
        )
        .with_block("timestamp_spec", NestedBlock::required_single(timestamp_spec_block()))
        .with_block("dimensions_spec", NestedBlock::single(dimensions_spec_block()))
        .with_block("metrics_spec", NestedBlock::list(metric_block()))
        .with_block("granularity_spec", NestedBlock::single(granularity_spec_block()))
        .with_block("input_format", NestedBlock::required_single(input_format_block()))
        .with_block("idle_config", NestedBlock::single(idle_config_block()))
        .with_block("tuning_config", NestedBlock::single(tuning_config_block()))
}

fn timestamp_spec_block() -> Block {
    Block::new()
        .with_description("Timestamp column and format")
        .with_attribute("column", Attribute::required_string())
        .with_attribute(
            "format",
            Attribute::optional_string().with_default(Value::from(DEFAULT_TIMESTAMP_FORMAT)),
        )
        .with_attribute("missing_value", Attribute::optional_string())
}

fn dimensions_spec_block() -> Block {
    Block::new()
        .with_attribute(
            "dimension_exclusions",
            Attribute::optional_string_set()
                .with_description("Columns excluded from dimension discovery"),
        )
        .with_block("dimensions", NestedBlock::list(dimension_block()))
        .with_block("spatial_dimensions", NestedBlock::list(spatial_dimension_block()))
}

fn dimension_block() -> Block {
    Block::new()
        .with_attribute("name", Attribute::required_string())
        .with_attribute(
            "type",
            Attribute::optional_string()
                .with_default(Value::from(DEFAULT_DIMENSION_TYPE))
                .with_description("Dimension type (string, long, float, double)"),
        )
        .with_attribute("multi_value_handling", Attribute::optional_string())
}

fn spatial_dimension_block() -> Block {
    Block::new()
        .with_attribute("dim_name", Attribute::required_string())
        .with_attribute("dims", Attribute::optional_string_list())
}

fn metric_block() -> Block {
    Block::new()
        .with_attribute("name", Attribute::required_string())
        .with_attribute(
            "type",
            Attribute::required_string()
                .with_description("Aggregator type (count, longSum, doubleSum, ...)"),
        )
        .with_attribute("field_name", Attribute::optional_string())
}

fn granularity_spec_block() -> Block {
    Block::new()
        .with_attribute(
            "type",
            Attribute::optional_string().with_default(Value::from(DEFAULT_GRANULARITY_TYPE)),
        )
        .with_attribute(
            "segment_granularity",
            Attribute::optional_string().with_default(Value::from(DEFAULT_SEGMENT_GRANULARITY)),
        )
        .with_attribute(
            "query_granularity",
            Attribute::optional_string().with_default(Value::from(DEFAULT_QUERY_GRANULARITY)),
        )
        .with_attribute(
            "rollup",
            Attribute::optional_bool().with_default(Value::Bool(true)),
        )
}

fn input_format_block() -> Block {
    Block::new()
        .with_description("Input data format")
        .with_attribute(
            "type",
            Attribute::required_string().with_description("Input format type (json, csv, tsv, ...)"),
        )
        .with_block("flat_spec", NestedBlock::single(flat_spec_block()))
}

fn flat_spec_block() -> Block {
    Block::new()
        .with_attribute(
            "use_field_discovery",
            Attribute::optional_bool().with_default(Value::Bool(true)),
        )
        .with_attribute("delimiter", Attribute::optional_string())
        .with_attribute("columns", Attribute::optional_string_list())
}

fn idle_config_block() -> Block {
    Block::new()
        .with_attribute(
            "enabled",
            Attribute::optional_bool().with_default(Value::Bool(false)),
        )
        .with_attribute("inactive_after_millis", Attribute::optional_int64())
}

fn tuning_config_block() -> Block {
    Block::new()
        .with_description("Tuning configuration; unset knobs are left to Druid")
        .with_attribute("max_rows_per_segment", Attribute::optional_int64())
        .with_attribute("max_rows_in_memory", Attribute::optional_int64())
        .with_attribute("max_bytes_in_memory", Attribute::optional_int64())
        .with_attribute("skip_bytes_in_memory_overhead_check", Attribute::optional_bool())
        .with_attribute("max_pending_persists", Attribute::optional_int64())
        .with_attribute("intermediate_persist_period", Attribute::optional_string())
        .with_attribute("max_parse_exceptions", Attribute::optional_int64())
        .with_attribute("max_saved_parse_exceptions", Attribute::optional_int64())
        .with_attribute("log_parse_exceptions", Attribute::optional_bool())
        .with_attribute("reset_offset_automatically", Attribute::optional_bool())
        .with_attribute("worker_threads", Attribute::optional_int64().with_min_value(1))
        .with_attribute("chat_threads", Attribute::optional_int64().with_min_value(1))
        .with_attribute("chat_retries", Attribute::optional_int64().with_min_value(0))
        .with_attribute("http_timeout", Attribute::optional_string())
        .with_attribute("shutdown_timeout", Attribute::optional_string())
        .with_attribute("segment_write_out_medium_factory", Attribute::optional_string_map())
        .with_block("index_spec", NestedBlock::single(index_spec_block()))
}

fn index_spec_block() -> Block {
    Block::new()
        .with_attribute("bitmap", Attribute::optional_string_map())
        .with_attribute(
            "dimension_compression",
            Attribute::optional_string().with_default(Value::from(DEFAULT_COMPRESSION)),
        )
        .with_attribute(
            "metric_compression",
            Attribute::optional_string().with_default(Value::from(DEFAULT_COMPRESSION)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::model::ResourceConfig;
    use crate::validation::validate;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "datasource": "orders",
            "topic": "orders-topic",
            "timestamp_spec": {"column": "ts"},
            "input_format": {"type": "json"},
            "consumer_properties": {"bootstrap.servers": "kafka:9092"}
        })
    }

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(validate(&resource_schema(), &valid()).is_empty());
    }

    #[test]
    fn test_topic_and_pattern_are_exclusive() {
        let mut config = valid();
        config["topic_pattern"] = json!("orders-.*");
        let diagnostics = validate(&resource_schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.starts_with("Only one of"));

        config["topic"] = Value::Null;
        config["topic_pattern"] = Value::Null;
        let diagnostics = validate(&resource_schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.starts_with("One of"));
    }

    #[test]
    fn test_bootstrap_servers_required() {
        let mut config = valid();
        config["consumer_properties"] = json!({"group.id": "druid"});
        let diagnostics = validate(&resource_schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].summary,
            "bootstrap.servers is required in consumer_properties"
        );
    }

    #[test]
    fn test_lower_bounds() {
        let mut config = valid();
        config["task_count"] = json!(0);
        config["replicas"] = json!(0);
        config["tuning_config"] = json!({"worker_threads": 0, "chat_threads": 1, "chat_retries": -1});

        let mut attributes: Vec<_> = validate(&resource_schema(), &config)
            .into_iter()
            .filter_map(|d| d.attribute)
            .collect();
        attributes.sort();
        assert_eq!(
            attributes,
            vec![
                "replicas",
                "task_count",
                "tuning_config.chat_retries",
                "tuning_config.worker_threads",
            ]
        );
    }

    #[test]
    fn test_required_blocks() {
        let mut config = valid();
        config.as_object_mut().unwrap().remove("timestamp_spec");
        config.as_object_mut().unwrap().remove("input_format");
        assert_eq!(validate(&resource_schema(), &config).len(), 2);
    }

    #[test]
    fn test_metric_type_required() {
        let mut config = valid();
        config["metrics_spec"] = json!([{"name": "count"}]);
        let diagnostics = validate(&resource_schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("metrics_spec.0.type"));
    }

    #[test]
    fn test_datasource_forces_replacement() {
        let schema = resource_schema();
        assert_eq!(schema.force_new_attributes().collect::<Vec<_>>(), vec!["datasource"]);
        assert_eq!(
            schema.computed_attributes().collect::<Vec<_>>(),
            vec!["id", "state", "supervisor_id"]
        );
    }

    // Schema defaults and model defaults must describe the same desired state.
    #[test]
    fn test_schema_defaults_match_model() {
        let schema = resource_schema();
        let config = ResourceConfig::from_value(&valid()).unwrap();
        let state = config.to_value().unwrap();

        for (name, attr) in &schema.block.attributes {
            if let Some(default) = &attr.default {
                assert_eq!(&state[name.as_str()], default, "default of {}", name);
            }
        }

        let timestamp = &schema.block.blocks["timestamp_spec"].block;
        assert_eq!(
            timestamp.attributes["format"].default,
            Some(state["timestamp_spec"]["format"].clone())
        );

        let index = ResourceConfig::from_value(&json!({
            "datasource": "orders",
            "tuning_config": {"index_spec": {}},
            "granularity_spec": {},
            "dimensions_spec": {"dimensions": [{"name": "user"}]},
            "input_format": {"type": "csv", "flat_spec": {}},
            "idle_config": {}
        }))
        .unwrap()
        .to_value()
        .unwrap();

        let defaults_of = |block: &Block, state: &Value| {
            for (name, attr) in &block.attributes {
                if let Some(default) = &attr.default {
                    assert_eq!(&state[name.as_str()], default, "default of {}", name);
                }
            }
        };
        let blocks = &schema.block.blocks;
        defaults_of(
            &blocks["tuning_config"].block.blocks["index_spec"].block,
            &index["tuning_config"]["index_spec"],
        );
        defaults_of(&blocks["granularity_spec"].block, &index["granularity_spec"]);
        defaults_of(
            &blocks["dimensions_spec"].block.blocks["dimensions"].block,
            &index["dimensions_spec"]["dimensions"][0],
        );
        defaults_of(
            &blocks["input_format"].block.blocks["flat_spec"].block,
            &index["input_format"]["flat_spec"],
        );
        defaults_of(&blocks["idle_config"].block, &index["idle_config"]);
    }
}

use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, unexpanded_env_vars};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<WorkflowConfig, ConfigError> {
    let (config, _) = load_config_with_yaml(path)?;
    Ok(config)
}

/// Load config and return both the validated config and the expanded YAML string
pub fn load_config_with_yaml(path: &Path) -> Result<(WorkflowConfig, String), ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let config = load_config_from_str(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(err) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), err),
        )),
        other => other,
    })?;

    Ok((config, expand_env_vars(&yaml_string)))
}

/// Expand `$env{}` references, parse, and validate a YAML document.
pub fn load_config_from_str(yaml: &str) -> Result<WorkflowConfig, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let raw: RawWorkflowConfig = serde_yaml::from_str(&yaml_string)?;
    validate(&raw)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let unexpanded = unexpanded_env_vars(yaml_string);
    if unexpanded.is_empty() {
        return Ok(());
    }

    let error_msg = if unexpanded.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=<value>\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables (e.g., export KAFKA_BROKERS=kafka:29092)\n\
             2. Replace the variables in the config file with actual values",
            unexpanded.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

/// Validate a raw config into its typed form.
///
/// Every problem found is reported in a single [`ConfigError::ValidationList`].
/// The function has no side effects, so the same input always yields the same
/// outcome.
pub fn validate(raw: &RawWorkflowConfig) -> Result<WorkflowConfig, ConfigError> {
    let mut errors = Vec::new();

    let name = match raw.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        Some(_) => {
            errors.push("name: must not be empty".to_string());
            None
        }
        None => {
            errors.push("missing required field 'name'".to_string());
            None
        }
    };

    let source = match &raw.source {
        Some(source) => validate_source(source, &mut errors),
        None => {
            errors.push("missing required section 'source'".to_string());
            None
        }
    };

    let destination = match &raw.destination {
        Some(destination) => validate_destination(destination, &mut errors),
        None => {
            errors.push("missing required section 'destination'".to_string());
            None
        }
    };

    check_pipeline(&raw.pipeline, &mut errors);
    check_retry(&raw.retry, &mut errors);

    match (name, source, destination) {
        (Some(name), Some(source), Some(destination)) if errors.is_empty() => Ok(WorkflowConfig {
            name,
            source,
            destination,
            pipeline: raw.pipeline.clone(),
            retry: raw.retry.clone(),
        }),
        _ => Err(ConfigError::ValidationList(errors)),
    }
}

impl WorkflowConfig {
    /// Re-check the invariants of an already typed config. Used when a config
    /// is assembled in code rather than loaded through [`validate`].
    pub fn check(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name: must not be empty".to_string());
        }

        check_batch_size("source", self.source.batch_size as i64, &mut errors);
        if self.source.time_window.is_zero() {
            errors.push("source: time_window must be > 0 seconds".to_string());
        }
        check_channel_list(
            "source",
            "consumer_topics",
            &self.source.channel.channel_names(),
            &mut errors,
        );
        if let SourceChannel::Kafka(cfg) = &self.source.channel {
            check_non_empty("source", "brokers", &cfg.brokers, &mut errors);
            check_non_empty("source", "group_id", &cfg.group_id, &mut errors);
        }

        check_batch_size("destination", self.destination.batch_size as i64, &mut errors);
        check_non_empty(
            "destination",
            "publisher_topic",
            &self.destination.channel.channel_name(),
            &mut errors,
        );
        if let SinkChannel::Kafka(cfg) = &self.destination.channel {
            check_non_empty("destination", "brokers", &cfg.brokers, &mut errors);
        }

        check_pipeline(&self.pipeline, &mut errors);
        check_retry(&self.retry, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationList(errors))
        }
    }
}

fn validate_source(raw: &RawSourceDescriptor, errors: &mut Vec<String>) -> Option<SourceDescriptor> {
    let context = "source";
    let kind = validate_kind(context, raw.channel_type.as_deref(), errors);

    let batch_size = match raw.batch_size {
        Some(size) => check_batch_size(context, size, errors),
        None => {
            errors.push(format!("{}: missing required field 'batch_size'", context));
            None
        }
    };

    let time_window = match raw.time_window {
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(window) if !window.is_zero() => Some(window),
            Ok(_) => {
                errors.push(format!(
                    "{}: time_window must be > 0 seconds, got {}",
                    context, secs
                ));
                None
            }
            Err(_) if secs.is_finite() && secs > 0.0 => {
                errors.push(format!(
                    "{}: time_window {} is too large to represent",
                    context, secs
                ));
                None
            }
            Err(_) => {
                errors.push(format!(
                    "{}: time_window must be > 0 seconds, got {}",
                    context, secs
                ));
                None
            }
        },
        None => {
            errors.push(format!("{}: missing required field 'time_window'", context));
            None
        }
    };

    let topics = match &raw.consumer_topics {
        Some(topics) => check_channel_list(context, "consumer_topics", topics, errors),
        None => {
            errors.push(format!(
                "{}: missing required field 'consumer_topics'",
                context
            ));
            None
        }
    };

    let channel = match kind? {
        ChannelKind::Kafka => {
            reject_field(context, ChannelKind::Kafka, "follow", raw.follow.is_some(), errors);
            let brokers = require_string(context, "brokers", raw.brokers.as_deref(), errors);
            let group_id = require_string(context, "group_id", raw.group_id.as_deref(), errors);
            SourceChannel::Kafka(KafkaSourceConfig {
                brokers: brokers?,
                group_id: group_id?,
                topics: topics?,
            })
        }
        ChannelKind::File => {
            reject_field(context, ChannelKind::File, "brokers", raw.brokers.is_some(), errors);
            reject_field(context, ChannelKind::File, "group_id", raw.group_id.is_some(), errors);
            SourceChannel::File(FileSourceConfig {
                paths: topics?
                    .iter()
                    .map(|topic| expand_tilde(Path::new(topic)))
                    .collect(),
                follow: raw.follow.unwrap_or(false),
            })
        }
        ChannelKind::Memory => {
            reject_field(context, ChannelKind::Memory, "brokers", raw.brokers.is_some(), errors);
            reject_field(context, ChannelKind::Memory, "group_id", raw.group_id.is_some(), errors);
            reject_field(context, ChannelKind::Memory, "follow", raw.follow.is_some(), errors);
            SourceChannel::Memory(MemorySourceConfig { channels: topics? })
        }
    };

    Some(SourceDescriptor {
        channel,
        batch_size: batch_size?,
        time_window: time_window?,
    })
}

fn validate_destination(
    raw: &RawDestinationDescriptor,
    errors: &mut Vec<String>,
) -> Option<DestinationDescriptor> {
    let context = "destination";
    let kind = validate_kind(context, raw.channel_type.as_deref(), errors);

    let batch_size = match raw.batch_size {
        Some(size) => check_batch_size(context, size, errors),
        None => {
            errors.push(format!("{}: missing required field 'batch_size'", context));
            None
        }
    };

    let topic = require_string(context, "publisher_topic", raw.publisher_topic.as_deref(), errors);

    let output_delimiter = raw.output_delimiter.clone().unwrap_or_else(|| ",".to_string());
    if output_delimiter.is_empty() {
        errors.push(format!("{}: output_delimiter must not be empty", context));
    }

    let channel = match kind? {
        ChannelKind::Kafka => {
            let brokers = require_string(context, "brokers", raw.brokers.as_deref(), errors);
            SinkChannel::Kafka(KafkaSinkConfig {
                brokers: brokers?,
                group_id: raw.group_id.clone().filter(|g| !g.trim().is_empty()),
                topic: topic?,
            })
        }
        ChannelKind::File => {
            reject_field(context, ChannelKind::File, "brokers", raw.brokers.is_some(), errors);
            reject_field(context, ChannelKind::File, "group_id", raw.group_id.is_some(), errors);
            SinkChannel::File(FileSinkConfig {
                path: expand_tilde(Path::new(&topic?)),
            })
        }
        ChannelKind::Memory => {
            reject_field(context, ChannelKind::Memory, "brokers", raw.brokers.is_some(), errors);
            reject_field(context, ChannelKind::Memory, "group_id", raw.group_id.is_some(), errors);
            SinkChannel::Memory(MemorySinkConfig { channel: topic? })
        }
    };

    Some(DestinationDescriptor {
        channel,
        batch_size: batch_size?,
        output_delimiter,
    })
}

fn validate_kind(context: &str, value: Option<&str>, errors: &mut Vec<String>) -> Option<ChannelKind> {
    match value {
        Some(value) => {
            let kind = ChannelKind::parse(value);
            if kind.is_none() {
                let expected: Vec<&str> = ChannelKind::ALL.iter().map(|k| k.as_str()).collect();
                errors.push(format!(
                    "{}: unknown channel type '{}' (expected one of: {})",
                    context,
                    value,
                    expected.join(", ")
                ));
            }
            kind
        }
        None => {
            errors.push(format!("{}: missing required field 'type'", context));
            None
        }
    }
}

fn check_batch_size(context: &str, value: i64, errors: &mut Vec<String>) -> Option<usize> {
    if value >= 1 {
        Some(value as usize)
    } else {
        errors.push(format!(
            "{}: batch_size must be >= 1, got {}",
            context, value
        ));
        None
    }
}

/// Channel lists are ordered sets: non-empty, no blank names, no duplicates.
fn check_channel_list(
    context: &str,
    field: &str,
    channels: &[String],
    errors: &mut Vec<String>,
) -> Option<Vec<String>> {
    if channels.is_empty() {
        errors.push(format!(
            "{}: {} must list at least one channel",
            context, field
        ));
        return None;
    }

    let before = errors.len();
    let mut seen = HashSet::new();
    for (i, channel) in channels.iter().enumerate() {
        if channel.trim().is_empty() {
            errors.push(format!("{}: {}[{}] must not be empty", context, field, i));
        } else if !seen.insert(channel.as_str()) {
            errors.push(format!(
                "{}: {}[{}]: duplicate channel '{}'",
                context, field, i, channel
            ));
        }
    }

    if errors.len() == before {
        Some(channels.to_vec())
    } else {
        None
    }
}

fn require_string(
    context: &str,
    field: &str,
    value: Option<&str>,
    errors: &mut Vec<String>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v.to_string()),
        Some(_) => {
            errors.push(format!("{}: {} must not be empty", context, field));
            None
        }
        None => {
            errors.push(format!("{}: missing required field '{}'", context, field));
            None
        }
    }
}

fn check_non_empty(context: &str, field: &str, value: &str, errors: &mut Vec<String>) {
    if value.trim().is_empty() {
        errors.push(format!("{}: {} must not be empty", context, field));
    }
}

fn reject_field(context: &str, kind: ChannelKind, field: &str, present: bool, errors: &mut Vec<String>) {
    if present {
        errors.push(format!(
            "{}: field '{}' is not valid for type '{}'",
            context, field, kind
        ));
    }
}

fn check_pipeline(pipeline: &PipelineConfig, errors: &mut Vec<String>) {
    if pipeline.max_in_flight_batches == 0 {
        errors.push("pipeline: max_in_flight_batches must be >= 1".to_string());
    }
    if pipeline.poll_timeout.is_zero() {
        errors.push("pipeline: poll_timeout must be > 0".to_string());
    }
    if pipeline.publish_timeout.is_zero() {
        errors.push("pipeline: publish_timeout must be > 0".to_string());
    }
}

fn check_retry(retry: &RetryConfig, errors: &mut Vec<String>) {
    for (name, policy) in [("source", &retry.source), ("sink", &retry.sink)] {
        if policy.initial_backoff > policy.max_backoff {
            errors.push(format!(
                "retry.{}: initial_backoff ({:?}) must not exceed max_backoff ({:?})",
                name, policy.initial_backoff, policy.max_backoff
            ));
        }
    }
}

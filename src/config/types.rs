use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Workflow configuration exactly as written in the YAML file.
///
/// Descriptor fields are all optional here so that validation can report
/// every missing or misplaced field at once instead of stopping at the first
/// serde error. Use [`crate::config::validate`] to turn this into a
/// [`WorkflowConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWorkflowConfig {
    pub name: Option<String>,
    pub source: Option<RawSourceDescriptor>,
    pub destination: Option<RawDestinationDescriptor>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSourceDescriptor {
    #[serde(rename = "type")]
    pub channel_type: Option<String>,
    #[serde(alias = "kafka_brokers")]
    pub brokers: Option<String>,
    pub group_id: Option<String>,
    pub batch_size: Option<i64>,
    #[serde(alias = "consumer_kafka_topics")]
    pub consumer_topics: Option<Vec<String>>,
    /// Seconds; fractional values are allowed.
    pub time_window: Option<f64>,
    pub follow: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDestinationDescriptor {
    #[serde(rename = "type")]
    pub channel_type: Option<String>,
    #[serde(alias = "kafka_brokers")]
    pub brokers: Option<String>,
    pub group_id: Option<String>,
    pub batch_size: Option<i64>,
    #[serde(alias = "publisher_kafka_topic")]
    pub publisher_topic: Option<String>,
    pub output_delimiter: Option<String>,
}

/// Validated, immutable workflow configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    /// Observability label only.
    pub name: String,
    pub source: SourceDescriptor,
    pub destination: DestinationDescriptor,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Kafka,
    File,
    Memory,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [ChannelKind::Kafka, ChannelKind::File, ChannelKind::Memory];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "kafka" => Some(ChannelKind::Kafka),
            "file" => Some(ChannelKind::File),
            "memory" => Some(ChannelKind::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Kafka => "kafka",
            ChannelKind::File => "file",
            ChannelKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub channel: SourceChannel,
    pub batch_size: usize,
    pub time_window: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceChannel {
    Kafka(KafkaSourceConfig),
    File(FileSourceConfig),
    Memory(MemorySourceConfig),
}

impl SourceChannel {
    /// Input channel names in subscription order.
    pub fn channel_names(&self) -> Vec<String> {
        match self {
            SourceChannel::Kafka(cfg) => cfg.topics.clone(),
            SourceChannel::File(cfg) => cfg
                .paths
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            SourceChannel::Memory(cfg) => cfg.channels.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KafkaSourceConfig {
    pub brokers: String,
    pub group_id: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSourceConfig {
    pub paths: Vec<PathBuf>,
    /// Keep waiting for new lines after EOF instead of ending the stream.
    pub follow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySourceConfig {
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationDescriptor {
    pub channel: SinkChannel,
    /// Number of output records joined into one outbound message.
    pub batch_size: usize,
    pub output_delimiter: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkChannel {
    Kafka(KafkaSinkConfig),
    File(FileSinkConfig),
    Memory(MemorySinkConfig),
}

impl SinkChannel {
    pub fn channel_name(&self) -> String {
        match self {
            SinkChannel::Kafka(cfg) => cfg.topic.clone(),
            SinkChannel::File(cfg) => cfg.path.display().to_string(),
            SinkChannel::Memory(cfg) => cfg.channel.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KafkaSinkConfig {
    pub brokers: String,
    /// Used as the producer `client.id` when present.
    pub group_id: Option<String>,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSinkConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySinkConfig {
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub flush_mode: FlushMode,
    #[serde(default = "default_max_in_flight_batches")]
    pub max_in_flight_batches: usize,
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,
    #[serde(default = "default_publish_timeout", with = "humantime_serde")]
    pub publish_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::default(),
            max_in_flight_batches: default_max_in_flight_batches(),
            poll_timeout: default_poll_timeout(),
            publish_timeout: default_publish_timeout(),
        }
    }
}

fn default_max_in_flight_batches() -> usize {
    8
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_publish_timeout() -> Duration {
    Duration::from_secs(10)
}

/// How a sealed batch is handed to the processing stage and sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Batches cross a bounded channel to a single delivery task; the next
    /// window opens immediately.
    #[default]
    Pipelined,
    /// Processing and publishing complete before the next window opens.
    Synchronous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_source_retry")]
    pub source: RetryPolicyConfig,
    #[serde(default = "default_sink_retry")]
    pub sink: RetryPolicyConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            source: default_source_retry(),
            sink: default_sink_retry(),
        }
    }
}

fn default_source_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        max_retries: 5,
        initial_backoff: Duration::from_millis(200),
        max_backoff: Duration::from_secs(5),
    }
}

fn default_sink_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        max_retries: 3,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(2),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

pub mod file;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod record;

use crate::config::types::{SourceChannel, SourceDescriptor};
use crate::config::ConfigError;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use file::FileSource;
pub use memory::{MemoryHub, MemoryOutbox, MemoryProducer, MemorySource};
pub use record::Record;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Transient failure; the caller decides whether to retry.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}

/// Outcome of a single poll.
#[derive(Debug)]
pub enum Polled {
    Record(Record),
    /// The timeout elapsed without a record becoming available.
    Empty,
    /// The source will never produce another record.
    Closed,
}

/// Pull-based access to one or more input channels.
///
/// Implementations are driven from a single task; `poll` takes `&mut self`
/// so concurrent calls against one instance are impossible. `poll` must
/// return within roughly `timeout`, yielding [`Polled::Empty`] when nothing
/// arrived in time.
#[async_trait]
pub trait RecordSource: Send {
    async fn poll(&mut self, timeout: Duration) -> Result<Polled, SourceError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Build the source selected by the descriptor's channel type.
///
/// Memory channels resolve against `hub`; a memory descriptor without a hub
/// is a configuration error.
pub fn build(
    descriptor: &SourceDescriptor,
    hub: Option<&MemoryHub>,
) -> Result<Box<dyn RecordSource>, ConfigError> {
    match &descriptor.channel {
        SourceChannel::Kafka(cfg) => build_kafka(cfg),
        SourceChannel::File(cfg) => Ok(Box::new(FileSource::new(cfg.paths.clone(), cfg.follow))),
        SourceChannel::Memory(cfg) => {
            let hub = hub.ok_or_else(|| {
                ConfigError::Validation(
                    "source type 'memory' requires a MemoryHub bound to the workflow builder"
                        .to_string(),
                )
            })?;
            Ok(Box::new(hub.subscribe(&cfg.channels)))
        }
    }
}

#[cfg(feature = "kafka")]
fn build_kafka(
    cfg: &crate::config::types::KafkaSourceConfig,
) -> Result<Box<dyn RecordSource>, ConfigError> {
    let source = kafka::KafkaSource::new(cfg).map_err(|e| {
        ConfigError::Validation(format!("failed to create kafka consumer: {}", e))
    })?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "kafka"))]
fn build_kafka(
    _cfg: &crate::config::types::KafkaSourceConfig,
) -> Result<Box<dyn RecordSource>, ConfigError> {
    Err(ConfigError::Validation(
        "source type 'kafka' requires cyberflow to be built with the 'kafka' feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::MemorySourceConfig;

    fn memory_descriptor() -> SourceDescriptor {
        SourceDescriptor {
            channel: SourceChannel::Memory(MemorySourceConfig {
                channels: vec!["input".to_string()],
            }),
            batch_size: 1,
            time_window: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_memory_source_without_hub_is_config_error() {
        let result = build(&memory_descriptor(), None);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_memory_source_built_from_descriptor() {
        let hub = MemoryHub::new();
        hub.producer("input").send("hello");

        let mut source = build(&memory_descriptor(), Some(&hub)).unwrap();
        match source.poll(Duration::from_millis(10)).await.unwrap() {
            Polled::Record(record) => assert_eq!(record.payload_str(), Some("hello")),
            other => panic!("expected a record, got {:?}", other),
        }
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn test_kafka_without_feature_fails_at_construction() {
        let descriptor = SourceDescriptor {
            channel: SourceChannel::Kafka(crate::config::types::KafkaSourceConfig {
                brokers: "kafka:29092".to_string(),
                group_id: "cyber-dp".to_string(),
                topics: vec!["input".to_string()],
            }),
            batch_size: 1,
            time_window: Duration::from_secs(5),
        };
        let err = build(&descriptor, None).err().unwrap();
        assert!(err.to_string().contains("'kafka' feature"));
    }
}

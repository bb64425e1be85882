pub mod encoder;
pub mod file;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

use crate::config::types::{DestinationDescriptor, SinkChannel};
use crate::config::ConfigError;
use crate::source::{MemoryHub, Record};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use encoder::{EncodedMessage, MessageEncoder};
pub use file::FileSink;
pub use memory::MemorySink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    /// Some records were durably accepted; `accepted` holds their indices
    /// into the slice passed to `publish`.
    #[error("partial publish ({} of {} records accepted): {}", .accepted.len(), .total, .reason)]
    Partial {
        accepted: Vec<usize>,
        total: usize,
        reason: String,
    },
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Unavailable(err.to_string())
    }
}

impl SinkError {
    /// Turn a failure that happened after some messages were accepted into a
    /// partial report, or return `cause` unchanged if nothing was accepted.
    pub fn after_progress(
        messages: &[EncodedMessage],
        accepted_messages: &[usize],
        total_records: usize,
        cause: SinkError,
    ) -> SinkError {
        if accepted_messages.is_empty() {
            return cause;
        }
        SinkError::Partial {
            accepted: encoder::accepted_records(messages, accepted_messages),
            total: total_records,
            reason: cause.to_string(),
        }
    }
}

/// Push-based delivery of output records to one output channel.
///
/// `publish` must finish (successfully or not) within roughly `timeout` and
/// must not reorder records across calls.
#[async_trait]
pub trait RecordSink: Send {
    async fn publish(&mut self, records: &[Record], timeout: Duration) -> Result<(), SinkError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Build the sink selected by the descriptor's channel type.
pub fn build(
    descriptor: &DestinationDescriptor,
    hub: Option<&MemoryHub>,
) -> Result<Box<dyn RecordSink>, ConfigError> {
    let encoder = MessageEncoder::from_descriptor(descriptor);
    match &descriptor.channel {
        SinkChannel::Kafka(cfg) => build_kafka(cfg, encoder),
        SinkChannel::File(cfg) => Ok(Box::new(FileSink::new(cfg.path.clone(), encoder))),
        SinkChannel::Memory(cfg) => {
            let hub = hub.ok_or_else(|| {
                ConfigError::Validation(
                    "destination type 'memory' requires a MemoryHub bound to the workflow builder"
                        .to_string(),
                )
            })?;
            Ok(Box::new(MemorySink::new(hub.clone(), &cfg.channel, encoder)))
        }
    }
}

#[cfg(feature = "kafka")]
fn build_kafka(
    cfg: &crate::config::types::KafkaSinkConfig,
    encoder: MessageEncoder,
) -> Result<Box<dyn RecordSink>, ConfigError> {
    let sink = kafka::KafkaSink::new(cfg, encoder).map_err(|e| {
        ConfigError::Validation(format!("failed to create kafka producer: {}", e))
    })?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "kafka"))]
fn build_kafka(
    _cfg: &crate::config::types::KafkaSinkConfig,
    _encoder: MessageEncoder,
) -> Result<Box<dyn RecordSink>, ConfigError> {
    Err(ConfigError::Validation(
        "destination type 'kafka' requires cyberflow to be built with the 'kafka' feature"
            .to_string(),
    ))
}

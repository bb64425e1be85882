use super::{MessageEncoder, RecordSink, SinkError};
use crate::source::{MemoryHub, Record};
use async_trait::async_trait;
use std::time::Duration;

/// Appends encoded messages to a [`MemoryHub`] outbox.
pub struct MemorySink {
    hub: MemoryHub,
    channel: String,
    encoder: MessageEncoder,
}

impl MemorySink {
    pub fn new(hub: MemoryHub, channel: &str, encoder: MessageEncoder) -> Self {
        Self {
            hub,
            channel: channel.to_string(),
            encoder,
        }
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn publish(&mut self, records: &[Record], _timeout: Duration) -> Result<(), SinkError> {
        let payloads = self
            .encoder
            .encode(records)
            .into_iter()
            .map(|m| m.payload)
            .collect();
        self.hub.append(&self.channel, payloads);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.channel)
    }
}

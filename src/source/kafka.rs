use super::{Polled, Record, RecordSource, SourceError};
use crate::config::types::KafkaSourceConfig;
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use std::time::Duration;
use tracing::info;

/// Broker-backed source. Offset bookkeeping is left to the client's
/// auto-commit.
pub struct KafkaSource {
    consumer: StreamConsumer,
    brokers: String,
    topics: Vec<String>,
}

impl KafkaSource {
    pub fn new(config: &KafkaSourceConfig) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("session.timeout.ms", "10000")
            .create()?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topics = ?config.topics,
            "Subscribed kafka consumer"
        );

        Ok(Self {
            consumer,
            brokers: config.brokers.clone(),
            topics: config.topics.clone(),
        })
    }
}

#[async_trait]
impl RecordSource for KafkaSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Polled, SourceError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(message)) => {
                let payload = Bytes::copy_from_slice(message.payload().unwrap_or_default());
                let mut record = Record::new(message.topic(), payload);
                record.offset = u64::try_from(message.offset()).ok();
                Ok(Polled::Record(record))
            }
            Ok(Err(e)) => Err(SourceError::Unavailable(e.to_string())),
            Err(_) => Ok(Polled::Empty),
        }
    }

    fn describe(&self) -> String {
        format!("kafka://{}/{}", self.brokers, self.topics.join(","))
    }
}

use super::{MessageEncoder, RecordSink, SinkError};
use crate::config::types::KafkaSinkConfig;
use crate::source::Record;
use async_trait::async_trait;
use futures::future::join_all;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{info, warn};

/// Publishes each encoded message as one broker message on a single topic.
pub struct KafkaSink {
    producer: FutureProducer,
    brokers: String,
    topic: String,
    encoder: MessageEncoder,
}

impl KafkaSink {
    pub fn new(config: &KafkaSinkConfig, encoder: MessageEncoder) -> Result<Self, KafkaError> {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "30000")
            .set("acks", "all");
        if let Some(group_id) = &config.group_id {
            client.set("client.id", group_id);
        }
        let producer: FutureProducer = client.create()?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            "Created kafka producer"
        );

        Ok(Self {
            producer,
            brokers: config.brokers.clone(),
            topic: config.topic.clone(),
            encoder,
        })
    }
}

#[async_trait]
impl RecordSink for KafkaSink {
    async fn publish(&mut self, records: &[Record], timeout: Duration) -> Result<(), SinkError> {
        let messages = self.encoder.encode(records);

        // The producer preserves submission order within a partition.
        let sends = messages.iter().map(|message| {
            let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(message.payload.as_ref());
            self.producer.send(record, Timeout::After(timeout))
        });
        let results = join_all(sends).await;

        let mut accepted = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(_) => accepted.push(i),
                Err((e, _)) => {
                    warn!(topic = %self.topic, error = %e, "Kafka delivery failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(KafkaError::MessageProduction(code))
                if code == rdkafka::types::RDKafkaErrorCode::MessageTimedOut =>
            {
                Err(SinkError::after_progress(
                    &messages,
                    &accepted,
                    records.len(),
                    SinkError::Timeout(timeout),
                ))
            }
            Some(e) => Err(SinkError::after_progress(
                &messages,
                &accepted,
                records.len(),
                SinkError::Unavailable(e.to_string()),
            )),
        }
    }

    fn describe(&self) -> String {
        format!("kafka://{}/{}", self.brokers, self.topic)
    }
}

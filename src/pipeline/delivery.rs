use super::channel::BatchReceiver;
use super::retry::RetryPolicy;
use crate::batcher::{Batch, BatchFailure};
use crate::processing::Processor;
use crate::sink::{RecordSink, SinkError};
use crate::source::Record;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of handing one batch to the processing stage and the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Published { records: usize },
    /// The processor returned no records; nothing was sent.
    Skipped,
    ProcessingFailed(BatchFailure),
    PublishFailed { failure: BatchFailure, published: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub batches_delivered: u64,
    pub batches_skipped: u64,
    pub records_published: u64,
    pub processing_failures: Vec<BatchFailure>,
    pub delivery_failures: Vec<BatchFailure>,
}

impl DeliveryStats {
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Published { records } => {
                self.batches_delivered += 1;
                self.records_published += records as u64;
            }
            DeliveryOutcome::Skipped => self.batches_skipped += 1,
            DeliveryOutcome::ProcessingFailed(failure) => self.processing_failures.push(failure),
            DeliveryOutcome::PublishFailed { failure, published } => {
                self.records_published += published as u64;
                self.delivery_failures.push(failure);
            }
        }
    }
}

/// Processes a sealed batch and publishes the output, retrying only the
/// records the sink has not acknowledged.
pub struct Delivery {
    processor: Box<dyn Processor>,
    sink: Box<dyn RecordSink>,
    retry: RetryPolicy,
    publish_timeout: Duration,
}

impl Delivery {
    pub fn new(
        processor: Box<dyn Processor>,
        sink: Box<dyn RecordSink>,
        retry: RetryPolicy,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            processor,
            sink,
            retry,
            publish_timeout,
        }
    }

    pub async fn deliver(&mut self, batch: Batch) -> DeliveryOutcome {
        let output = match self.processor.process(&batch) {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    sequence_num = batch.sequence_num,
                    trigger = %batch.trigger,
                    records = batch.len(),
                    error = %e,
                    "Processing failed, batch dropped"
                );
                return DeliveryOutcome::ProcessingFailed(BatchFailure::new(
                    &batch,
                    batch.len(),
                    e.to_string(),
                ));
            }
        };

        if output.is_empty() {
            debug!(sequence_num = batch.sequence_num, "Processor produced no records");
            return DeliveryOutcome::Skipped;
        }

        let total = output.len();
        let mut pending = output;
        let mut attempt = 0;
        loop {
            let err = match self.sink.publish(&pending, self.publish_timeout).await {
                Ok(()) => {
                    debug!(
                        sequence_num = batch.sequence_num,
                        trigger = %batch.trigger,
                        records = total,
                        "Published batch"
                    );
                    return DeliveryOutcome::Published { records: total };
                }
                Err(err) => err,
            };

            if let SinkError::Partial { accepted, .. } = &err {
                pending = unacknowledged(pending, accepted);
                if pending.is_empty() {
                    return DeliveryOutcome::Published { records: total };
                }
            }

            if attempt >= self.retry.max_retries {
                error!(
                    sequence_num = batch.sequence_num,
                    sink = %self.sink.describe(),
                    unpublished = pending.len(),
                    error = %err,
                    "Publish retries exhausted, batch dropped"
                );
                return DeliveryOutcome::PublishFailed {
                    failure: BatchFailure::new(&batch, pending.len(), err.to_string()),
                    published: total - pending.len(),
                };
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                sequence_num = batch.sequence_num,
                attempt = attempt + 1,
                remaining = pending.len(),
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "Publish failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub fn describe_sink(&self) -> String {
        self.sink.describe()
    }
}

fn unacknowledged(records: Vec<Record>, accepted: &[usize]) -> Vec<Record> {
    let accepted: HashSet<usize> = accepted.iter().copied().collect();
    records
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !accepted.contains(i))
        .map(|(_, record)| record)
        .collect()
}

/// Deliver batches from `rx` in arrival order until the sender side closes.
pub async fn run_delivery(mut delivery: Delivery, mut rx: BatchReceiver) -> DeliveryStats {
    let mut stats = DeliveryStats::default();
    while let Some(batch) = rx.recv().await {
        stats.record(delivery.deliver(batch).await);
    }
    info!(
        batches = stats.batches_delivered,
        records = stats.records_published,
        "Delivery task finished"
    );
    stats
}

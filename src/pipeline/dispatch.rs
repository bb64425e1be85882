use super::channel::{batch_channel, BatchSender};
use super::delivery::{run_delivery, Delivery, DeliveryStats};
use crate::batcher::Batch;
use crate::config::types::FlushMode;
use tokio::task::JoinHandle;
use tracing::debug;

use super::PipelineError;

/// Hands sealed batches to delivery, either inline or through a bounded
/// channel to a dedicated delivery task.
pub enum Dispatch {
    Synchronous {
        delivery: Delivery,
        stats: DeliveryStats,
    },
    Pipelined {
        tx: BatchSender,
        handle: JoinHandle<DeliveryStats>,
    },
}

impl Dispatch {
    /// Must be called from within a tokio runtime when `mode` is pipelined.
    pub fn new(mode: FlushMode, max_in_flight: usize, delivery: Delivery) -> Self {
        match mode {
            FlushMode::Synchronous => Dispatch::Synchronous {
                delivery,
                stats: DeliveryStats::default(),
            },
            FlushMode::Pipelined => {
                let (tx, rx) = batch_channel(max_in_flight);
                let handle = tokio::spawn(run_delivery(delivery, rx));
                Dispatch::Pipelined { tx, handle }
            }
        }
    }

    /// Submit a batch. In pipelined mode this waits while the channel is full.
    pub async fn submit(&mut self, batch: Batch) -> Result<(), PipelineError> {
        match self {
            Dispatch::Synchronous { delivery, stats } => {
                stats.record(delivery.deliver(batch).await);
                Ok(())
            }
            Dispatch::Pipelined { tx, .. } => {
                if tx.capacity() == 0 {
                    debug!(
                        sequence_num = batch.sequence_num,
                        "Delivery queue full, waiting"
                    );
                }
                tx.send(batch)
                    .await
                    .map_err(|_| PipelineError::DeliveryClosed)
            }
        }
    }

    /// Close the hand-off and wait for every submitted batch to be delivered.
    pub async fn finish(self) -> Result<DeliveryStats, PipelineError> {
        match self {
            Dispatch::Synchronous { stats, .. } => Ok(stats),
            Dispatch::Pipelined { tx, handle } => {
                drop(tx);
                Ok(handle.await?)
            }
        }
    }
}

use crate::batcher::Batch;
use tokio::sync::mpsc;

pub type BatchSender = mpsc::Sender<Batch>;
pub type BatchReceiver = mpsc::Receiver<Batch>;

/// Bounded hand-off between the batcher and the delivery task.
/// A full channel blocks the batcher until delivery catches up.
pub fn batch_channel(max_in_flight: usize) -> (BatchSender, BatchReceiver) {
    mpsc::channel(max_in_flight.max(1))
}

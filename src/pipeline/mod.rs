pub mod channel;
pub mod delivery;
pub mod dispatch;
pub mod retry;

pub use channel::{batch_channel, BatchReceiver, BatchSender};
pub use delivery::{run_delivery, Delivery, DeliveryOutcome, DeliveryStats};
pub use dispatch::Dispatch;
pub use retry::RetryPolicy;

use thiserror::Error;

/// Errors that can occur while handing batches to delivery
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("delivery task stopped accepting batches")]
    DeliveryClosed,

    #[error("delivery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

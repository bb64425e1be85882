pub mod batch;
pub mod window;
pub mod windowed;

pub use batch::{Batch, BatchFailure, TriggerReason, WindowInfo};
pub use window::WindowState;
pub use windowed::{BatcherEvent, BatcherStats, WindowedBatcher};

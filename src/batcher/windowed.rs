use super::batch::{Batch, TriggerReason, WindowInfo};
use super::window::WindowState;
use crate::config::types::SourceDescriptor;
use crate::source::{Polled, RecordSource, SourceError};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

/// What the batcher hands back to its caller.
#[derive(Debug)]
pub enum BatcherEvent {
    /// A window reached its size or time threshold.
    Sealed(Batch),
    /// The source failed. The in-progress window is kept intact.
    SourceError(SourceError),
    /// The source reached end of stream; carries the drained final window.
    Exhausted(Option<Batch>),
    /// Stop was requested; carries the drained final window.
    Stopped(Option<Batch>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatcherStats {
    pub batches_sealed: u64,
    pub records_received: u64,
    pub empty_windows: u64,
    pub successful_polls: u64,
}

/// Accumulates records from a source into windows sealed by size or time.
pub struct WindowedBatcher {
    window: WindowState,
    next_sequence: u64,
    poll_ceiling: Duration,
    stats: BatcherStats,
}

impl WindowedBatcher {
    /// Open the first window now. `poll_ceiling` caps a single source poll so
    /// stop requests are noticed promptly.
    pub fn new(batch_size: usize, time_window: Duration, poll_ceiling: Duration) -> Self {
        Self {
            window: WindowState::open(batch_size, time_window, Instant::now()),
            next_sequence: 0,
            poll_ceiling,
            stats: BatcherStats::default(),
        }
    }

    pub fn from_descriptor(descriptor: &SourceDescriptor, poll_ceiling: Duration) -> Self {
        Self::new(descriptor.batch_size, descriptor.time_window, poll_ceiling)
    }

    /// Poll `source` until something worth reporting happens.
    ///
    /// `stop` is checked between polls; a poll already in progress always
    /// runs to completion (bounded by its timeout).
    pub async fn next_event(
        &mut self,
        source: &mut dyn RecordSource,
        stop: &CancellationToken,
    ) -> BatcherEvent {
        loop {
            if stop.is_cancelled() {
                return BatcherEvent::Stopped(self.drain());
            }

            let now = Instant::now();
            if self.window.is_expired(now) {
                if self.window.is_empty() {
                    self.stats.empty_windows += 1;
                    trace!("Window expired with no records");
                    self.window.restart(now);
                    continue;
                }
                return BatcherEvent::Sealed(self.seal(TriggerReason::Time));
            }

            let timeout = self.window.remaining(now).min(self.poll_ceiling);
            match source.poll(timeout).await {
                Ok(Polled::Record(record)) => {
                    self.stats.successful_polls += 1;
                    self.stats.records_received += 1;
                    // Checked before expiry so size wins a tie.
                    if self.window.push(record) {
                        return BatcherEvent::Sealed(self.seal(TriggerReason::Size));
                    }
                }
                Ok(Polled::Empty) => {
                    self.stats.successful_polls += 1;
                }
                Ok(Polled::Closed) => {
                    debug!(source = %source.describe(), "Source reached end of stream");
                    return BatcherEvent::Exhausted(self.drain());
                }
                Err(e) => return BatcherEvent::SourceError(e),
            }
        }
    }

    /// Seal the in-progress window with [`TriggerReason::Drain`] if it holds
    /// any records.
    pub fn drain(&mut self) -> Option<Batch> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.seal(TriggerReason::Drain))
    }

    pub fn stats(&self) -> BatcherStats {
        self.stats
    }

    /// Number of polls that did not fail. Used to detect recovery after
    /// source errors.
    pub fn successful_polls(&self) -> u64 {
        self.stats.successful_polls
    }

    /// Sequence number the next sealed batch will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    fn seal(&mut self, trigger: TriggerReason) -> Batch {
        let start = self.window.opened_wall();
        let records = self.window.restart(Instant::now());
        let batch = Batch {
            batch_id: Uuid::new_v4(),
            sequence_num: self.next_sequence,
            window: WindowInfo {
                start,
                end: Utc::now(),
            },
            trigger,
            records,
        };

        self.next_sequence += 1;
        self.stats.batches_sealed += 1;
        debug!(
            sequence_num = batch.sequence_num,
            trigger = %trigger,
            records = batch.len(),
            "Sealed batch"
        );
        batch
    }
}

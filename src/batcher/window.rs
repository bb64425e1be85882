use crate::source::Record;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// In-progress window: the accumulated records plus the thresholds that seal it.
///
/// Expiry is measured on tokio's monotonic clock so paused-time tests drive it
/// deterministically. The wall-clock start is only reported.
#[derive(Debug)]
pub struct WindowState {
    batch_size: usize,
    time_window: Duration,
    opened_at: Instant,
    opened_wall: DateTime<Utc>,
    records: Vec<Record>,
}

impl WindowState {
    pub fn open(batch_size: usize, time_window: Duration, now: Instant) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            time_window,
            opened_at: now,
            opened_wall: Utc::now(),
            records: Vec::with_capacity(batch_size.min(1024)),
        }
    }

    /// Append a record. Returns true once the window is full.
    pub fn push(&mut self, record: Record) -> bool {
        self.records.push(record);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.opened_at) >= self.time_window
    }

    /// Time left before the window expires.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.time_window
            .saturating_sub(now.saturating_duration_since(self.opened_at))
    }

    pub fn opened_wall(&self) -> DateTime<Utc> {
        self.opened_wall
    }

    /// Reset to an empty window opened at `now`, returning the records held.
    pub fn restart(&mut self, now: Instant) -> Vec<Record> {
        self.opened_at = now;
        self.opened_wall = Utc::now();
        std::mem::replace(
            &mut self.records,
            Vec::with_capacity(self.batch_size.min(1024)),
        )
    }
}

use crate::source::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Records collected within one window instance.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Unique batch ID
    pub batch_id: Uuid,

    /// Monotonic sequence number for this workflow.
    /// Starts at 0, increments by 1 per sealed batch.
    pub sequence_num: u64,

    pub window: WindowInfo,

    /// Why the window was sealed
    pub trigger: TriggerReason,

    /// Records in arrival order
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// Wall-clock time the window opened (inclusive)
    pub start: DateTime<Utc>,

    /// Wall-clock time the window was sealed
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerReason {
    /// The window reached `batch_size` records.
    Size,
    /// The window reached `time_window` with at least one record.
    Time,
    /// The workflow stopped accepting new windows.
    Drain,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Size => "size",
            TriggerReason::Time => "time",
            TriggerReason::Drain => "drain",
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch that could not be delivered, as reported in the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub sequence_num: u64,
    pub trigger: TriggerReason,
    pub records: usize,
    pub reason: String,
}

impl BatchFailure {
    pub fn new(batch: &Batch, records: usize, reason: impl Into<String>) -> Self {
        Self {
            sequence_num: batch.sequence_num,
            trigger: batch.trigger,
            records,
            reason: reason.into(),
        }
    }
}

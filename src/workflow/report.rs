use super::WorkflowError;
use crate::batcher::{BatchFailure, BatcherStats};
use crate::pipeline::DeliveryStats;
use serde::Serialize;

/// Summary of one workflow run, printed by the CLI as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub workflow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_version: Option<u64>,
    pub records_received: u64,
    pub batches_sealed: u64,
    pub empty_windows: u64,
    pub batches_delivered: u64,
    pub batches_skipped: u64,
    pub records_published: u64,
    pub source_errors: u64,
    pub processing_failures: Vec<BatchFailure>,
    pub delivery_failures: Vec<BatchFailure>,
    /// Set when the source stayed unavailable past its retry budget.
    pub fatal: Option<FatalError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FatalError {
    pub attempts: u32,
    pub reason: String,
}

impl RunReport {
    pub fn new(workflow: &str, config_version: Option<u64>) -> Self {
        Self {
            workflow: workflow.to_string(),
            config_version,
            ..Self::default()
        }
    }

    pub(crate) fn absorb_batcher(&mut self, stats: BatcherStats) {
        self.records_received = stats.records_received;
        self.batches_sealed = stats.batches_sealed;
        self.empty_windows = stats.empty_windows;
    }

    pub(crate) fn absorb_delivery(&mut self, stats: DeliveryStats) {
        self.batches_delivered = stats.batches_delivered;
        self.batches_skipped = stats.batches_skipped;
        self.records_published = stats.records_published;
        self.processing_failures = stats.processing_failures;
        self.delivery_failures = stats.delivery_failures;
    }

    /// True when every sealed batch was delivered or skipped and the source
    /// never escalated.
    pub fn is_clean(&self) -> bool {
        self.fatal.is_none()
            && self.processing_failures.is_empty()
            && self.delivery_failures.is_empty()
    }

    /// Map a fatal source escalation to an error, keeping the report otherwise.
    pub fn into_result(self) -> Result<RunReport, WorkflowError> {
        match self.fatal {
            Some(FatalError { attempts, reason }) => {
                Err(WorkflowError::SourceUnavailable { attempts, reason })
            }
            None => Ok(self),
        }
    }
}

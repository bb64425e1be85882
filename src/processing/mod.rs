//! The processing stage: an opaque function from one sealed batch to the
//! records that should be published for it.

use crate::batcher::Batch;
use crate::source::Record;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("processing failed: {0}")]
pub struct ProcessingError(pub String);

impl ProcessingError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Transforms one sealed batch into output records.
///
/// Invoked at most once per batch; a failed batch is reported and never
/// retried. Returning no records skips publishing for that batch.
pub trait Processor: Send {
    fn process(&mut self, batch: &Batch) -> Result<Vec<Record>, ProcessingError>;
}

impl<F> Processor for F
where
    F: FnMut(&Batch) -> Result<Vec<Record>, ProcessingError> + Send,
{
    fn process(&mut self, batch: &Batch) -> Result<Vec<Record>, ProcessingError> {
        self(batch)
    }
}

/// Republishes every record unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Processor for Passthrough {
    fn process(&mut self, batch: &Batch) -> Result<Vec<Record>, ProcessingError> {
        Ok(batch.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::{TriggerReason, WindowInfo};
    use chrono::Utc;
    use uuid::Uuid;

    fn batch(payloads: &[&str]) -> Batch {
        let now = Utc::now();
        Batch {
            batch_id: Uuid::new_v4(),
            sequence_num: 0,
            window: WindowInfo { start: now, end: now },
            trigger: TriggerReason::Size,
            records: payloads.iter().map(|p| Record::new("in", p.to_string())).collect(),
        }
    }

    #[test]
    fn test_passthrough_returns_records() {
        let input = batch(&["a", "b"]);
        let output = Passthrough.process(&input).unwrap();
        assert_eq!(output, input.records);
    }

    #[test]
    fn test_closure_is_a_processor() {
        let mut calls = 0;
        let mut upper = |batch: &Batch| -> Result<Vec<Record>, ProcessingError> {
            calls += 1;
            Ok(batch
                .records
                .iter()
                .map(|r| Record::new("out", r.payload_str().unwrap_or("").to_uppercase()))
                .collect())
        };

        let output = upper.process(&batch(&["cyber test 1"])).unwrap();
        assert_eq!(output[0].payload_str(), Some("CYBER TEST 1"));
        drop(upper);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_boxed_processor_reports_error() {
        let mut failing: Box<dyn Processor> =
            Box::new(|_: &Batch| -> Result<Vec<Record>, ProcessingError> {
                Err(ProcessingError::new("lookup service down"))
            });
        let err = failing.process(&batch(&["a"])).unwrap_err();
        assert_eq!(err.to_string(), "processing failed: lookup service down");
    }
}
